// demos/headless_fill.rs
//! Renders one two-segment fill tile offscreen and prints the pixel under
//! each segment.
//!
//! Run with `RUST_LOG=debug` to see the cache activity.

use wgpu_drawables::renderer::wgpu_backend::{WgpuDevice, WgpuEncoder};
use wgpu_drawables::renderer::{
    AttributeFormat, AttributeValue, DrawSegment, IndexVector, RenderTargetFormats, UniformBufferArray,
    VertexVector,
};
use wgpu_drawables::{CoreSettings, DrawableDescriptor, DrawableRenderer, ShaderManifest, ShaderSource, UniformMask};

const SIZE: u32 = 256;
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn fill_manifest() -> Result<ShaderManifest, wgpu_drawables::ManifestError> {
    let mut manifest = ShaderManifest::new();
    manifest.insert(
        ShaderSource::new("fill", include_str!("assets/fill.wgsl"))
            .with_properties(["color", "opacity"])
            .with_buffer_names(["a_pos", "a_color", "a_opacity"])
            .with_attribute("a_pos", AttributeFormat::Short2, None)
            .with_attribute("a_color", AttributeFormat::Float4, Some(vec![0.0, 0.0, 0.0, 1.0]))
            .with_attribute("a_opacity", AttributeFormat::Float, Some(vec![1.0]))
            .with_uniform_block("FillDrawableUBO", 0, 16),
    )?;
    Ok(manifest)
}

/// Left and right halves of the tile as two quads.
fn tile() -> DrawableDescriptor<wgpu_drawables::renderer::wgpu_backend::WgpuBuffer> {
    let positions: [[i16; 2]; 8] = [
        [0, 0],
        [4096, 0],
        [4096, 8192],
        [0, 8192],
        [4096, 0],
        [8192, 0],
        [8192, 8192],
        [4096, 8192],
    ];
    let mut uniforms = UniformBufferArray::new();
    uniforms.set("FillDrawableUBO", &[0.1f32, 0.6, 0.9, 1.0]);

    DrawableDescriptor::new("tile 0/0/0 water", "fill")
        .with_mask(UniformMask::from_bits(0b01))
        .with_vertex_count(positions.len())
        .with_attribute("a_pos", AttributeValue::per_vertex(VertexVector::from_pod(&positions)))
        .with_attribute("a_opacity", AttributeValue::constant(0.5f32))
        .with_indices(IndexVector::from_u16(&[0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]))
        .with_segment(DrawSegment::new(0, 6, 0, 4))
        // vec2<u32> does not match the shader's vec2<i32> input, so this
        // segment's pipeline fails validation and is skipped.
        .with_segment(DrawSegment::new(6, 6, 4, 4).with_attribute_format("a_pos", AttributeFormat::UShort2))
        .with_uniforms(uniforms)
}

fn read_pixels(device: &WgpuDevice, texture: &wgpu::Texture) -> Result<Vec<u8>, String> {
    let bytes_per_row = (SIZE * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let readback = device.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback"),
        size: u64::from(bytes_per_row * SIZE),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(SIZE),
            },
        },
        wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
    );
    device.queue().submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    device
        .device()
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| format!("poll failed: {e:?}"))?;
    rx.recv()
        .map_err(|_| "readback channel closed".to_string())?
        .map_err(|e| format!("readback map failed: {e:?}"))?;

    let mapped = slice.get_mapped_range();
    let row_bytes = SIZE as usize * 4;
    let mut out = Vec::with_capacity(row_bytes * SIZE as usize);
    for row in 0..SIZE as usize {
        let start = row * bytes_per_row as usize;
        out.extend_from_slice(&mapped[start..start + row_bytes]);
    }
    drop(mapped);
    readback.unmap();
    Ok(out)
}

fn pixel(pixels: &[u8], x: u32, y: u32) -> &[u8] {
    let start = ((y * SIZE + x) * 4) as usize;
    &pixels[start..start + 4]
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    wgpu_drawables::init_logging();

    let device = WgpuDevice::headless()?;
    let settings = CoreSettings::load_from_path("demos/assets/settings.json");
    let mut renderer = DrawableRenderer::new(fill_manifest()?, settings);
    let handle = renderer.build_drawable(&device, tile())?;

    let texture = device.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("Tile Target"),
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let targets = RenderTargetFormats::color_only(FORMAT);

    for _ in 0..3 {
        renderer.begin_frame();
        let status = renderer.upload(&device, handle);
        log::info!("Upload: {:?}", status);

        let mut encoder = device
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Tile Frame") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tile Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let mut recorder = WgpuEncoder::new(&device, &mut pass);
            let summary = renderer.encode_draw(&device, &mut recorder, &targets, handle);
            log::info!("Draw: {:?}", summary);
        }
        device.queue().submit(Some(encoder.finish()));
        renderer.end_frame();
    }

    let pixels = read_pixels(&device, &texture)?;
    println!("left  {:?}", pixel(&pixels, SIZE / 4, SIZE / 2));
    println!("right {:?}", pixel(&pixels, SIZE * 3 / 4, SIZE / 2));
    println!("{:#?}", renderer.stats());
    for diagnostic in renderer.diagnostics().entries() {
        println!("{}", diagnostic);
    }

    renderer.teardown();
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Application error: {err}");
    }
}
