// renderer/renderer.rs
use std::rc::Rc;

use crate::asset::{AssetCache, Handle, ShaderManifest};
use crate::error::{BuildError, ShaderError};
use crate::renderer::drawable::{DrawContext, UploadContext};
use crate::renderer::{
    BufferCache, BufferStats, CommandEncoder, CompiledShaderProgram, DiagnosticKind, Diagnostics,
    DrawSummary, Drawable, DrawableDescriptor, GraphicsDevice, PipelineCache, PipelineStats,
    RenderTargetFormats, ShaderRegistry, UniformMask, UploadStatus,
};
use crate::settings::CoreSettings;

#[derive(Clone, Copy, Debug, Default)]
pub struct RendererStats {
    pub frames: u64,
    pub draw_calls: u32,
    pub skipped_segments: u32,
    pub uploads: u32,
    pub rebuilds: u32,
    pub shader_variants: usize,
    pub pipelines: PipelineStats,
    pub buffers: BufferStats,
}

impl RendererStats {
    fn reset_frame(&mut self) {
        self.draw_calls = 0;
        self.skipped_segments = 0;
        self.uploads = 0;
        self.rebuilds = 0;
    }
}

/// Owns the shader, pipeline and buffer caches plus every drawable built through them.
pub struct DrawableRenderer<D: GraphicsDevice> {
    settings: CoreSettings,
    manifest: ShaderManifest,
    shaders: ShaderRegistry<D>,
    pipelines: PipelineCache<D>,
    buffers: BufferCache<D>,
    drawables: AssetCache<Drawable<D>>,
    diagnostics: Diagnostics,
    stats: RendererStats,
    next_drawable_id: u64,
}

impl<D: GraphicsDevice> DrawableRenderer<D> {
    pub fn new(manifest: ShaderManifest, settings: CoreSettings) -> Self {
        let settings = settings.validate();
        log::info!(
            "Drawable renderer ready: {} shaders, {:?} buffers, release delay {} frames",
            manifest.len(),
            settings.buffer_usage,
            settings.release_delay_frames
        );
        Self {
            shaders: ShaderRegistry::new(settings.program_defines.clone()),
            pipelines: PipelineCache::new(),
            buffers: BufferCache::new(settings.release_delay_frames),
            drawables: AssetCache::new(),
            diagnostics: Diagnostics::new(settings.suppress_repeated_diagnostics),
            stats: RendererStats::default(),
            next_drawable_id: 1,
            manifest,
            settings,
        }
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn manifest(&self) -> &ShaderManifest {
        &self.manifest
    }

    pub fn shader_variant(
        &mut self,
        device: &D,
        base: &str,
        mask: UniformMask,
    ) -> Result<Rc<CompiledShaderProgram<D>>, ShaderError> {
        self.shaders.get_or_create(device, &self.manifest, base, mask)
    }

    /// Builds a drawable against its shader variant.
    ///
    /// A shader that cannot be compiled does not fail the build: the drawable
    /// is stored as [`DrawableState::Unusable`](crate::renderer::DrawableState::Unusable)
    /// and never drawn. Structural errors in `desc` are returned.
    pub fn build_drawable(
        &mut self,
        device: &D,
        desc: DrawableDescriptor<D::Buffer>,
    ) -> Result<Handle<Drawable<D>>, BuildError> {
        let shader = match self.shaders.get_or_create(device, &self.manifest, &desc.shader, desc.mask) {
            Ok(shader) => Some(shader),
            Err(err) => {
                let kind = match err {
                    ShaderError::Compilation { .. } => DiagnosticKind::ShaderCompilationFailure,
                    _ => DiagnosticKind::MissingShader,
                };
                let shader_name = format!("{}#{}", desc.shader, desc.mask);
                // Unusable repeats an earlier failure, which was already reported.
                if !matches!(err, ShaderError::Unusable(_)) {
                    self.diagnostics.report(kind, format!("shader {}", shader_name), err.to_string());
                }
                self.diagnostics.report(
                    DiagnosticKind::MissingShader,
                    format!("drawable '{}' shader {}", desc.name, shader_name),
                    "drawable will not be drawn",
                );
                None
            }
        };

        let id = self.next_drawable_id;
        let drawable = Drawable::new(id, desc, shader)?;
        self.next_drawable_id += 1;
        log::debug!("Built drawable {:?}", drawable);
        Ok(self.drawables.insert(drawable))
    }

    /// Returns `false` when `handle` is stale.
    pub fn mark_dirty(&mut self, handle: Handle<Drawable<D>>) -> bool {
        match self.drawables.get_mut(handle) {
            Some(drawable) => {
                drawable.mark_dirty();
                true
            }
            None => false,
        }
    }

    pub fn upload(&mut self, device: &D, handle: Handle<Drawable<D>>) -> UploadStatus {
        let Some(drawable) = self.drawables.get_mut(handle) else {
            log::warn!("Upload requested for unknown drawable {:?}", handle);
            return UploadStatus::Missing;
        };
        let mut ctx = UploadContext {
            device,
            buffers: &mut self.buffers,
            diagnostics: &mut self.diagnostics,
            usage: self.settings.buffer_usage,
        };
        let status = drawable.upload(&mut ctx);
        self.stats.uploads += 1;
        if let UploadStatus::Rebuilt { .. } = status {
            self.stats.rebuilds += 1;
        }
        status
    }

    pub fn encode_draw<E>(
        &mut self,
        device: &D,
        encoder: &mut E,
        targets: &RenderTargetFormats,
        handle: Handle<Drawable<D>>,
    ) -> DrawSummary
    where
        E: CommandEncoder<D> + ?Sized,
    {
        let Some(drawable) = self.drawables.get_mut(handle) else {
            log::warn!("Draw requested for unknown drawable {:?}", handle);
            return DrawSummary::default();
        };
        let mut ctx = DrawContext {
            device,
            pipelines: &mut self.pipelines,
            diagnostics: &mut self.diagnostics,
        };
        let summary = drawable.encode(&mut ctx, encoder, targets);
        self.stats.draw_calls += summary.draw_calls;
        self.stats.skipped_segments += summary.skipped_segments;
        summary
    }

    pub fn drawable(&self, handle: Handle<Drawable<D>>) -> Option<&Drawable<D>> {
        self.drawables.get(handle)
    }

    pub fn drawable_mut(&mut self, handle: Handle<Drawable<D>>) -> Option<&mut Drawable<D>> {
        self.drawables.get_mut(handle)
    }

    /// Drops the drawable; its buffers go away once nothing else shares them.
    pub fn remove_drawable(&mut self, handle: Handle<Drawable<D>>) -> Option<Drawable<D>> {
        self.drawables.remove(handle)
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    pub fn begin_frame(&mut self) {
        self.stats.reset_frame();
    }

    /// Frame boundary: releases replaced buffers that are no longer referenced.
    pub fn end_frame(&mut self) {
        let released = self.buffers.finish_frame();
        self.stats.frames += 1;
        if released > 0 {
            log::debug!(
                "Frame {}: released {} buffers, {} pending",
                self.stats.frames,
                released,
                self.buffers.pending_release()
            );
        }
    }

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            shader_variants: self.shaders.len(),
            pipelines: self.pipelines.stats(),
            buffers: self.buffers.stats(),
            ..self.stats
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Releases every drawable and compiled object. The renderer stays usable.
    pub fn teardown(&mut self) {
        log::info!(
            "Tearing down {} drawables, {} pipelines",
            self.drawables.len(),
            self.pipelines.len()
        );
        self.drawables.clear();
        self.pipelines.clear();
        self.shaders.teardown();
        self.buffers.clear();
    }
}
