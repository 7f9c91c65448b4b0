mod support;

use std::collections::BTreeMap;
use std::rc::Rc;

use support::{manifest, MockDevice};
use wgpu_drawables::renderer::{AttributeFormat, ShaderRegistry, UniformMask};
use wgpu_drawables::{ShaderError, ShaderSource};

#[test]
fn same_variant_compiles_once() {
    let device = MockDevice::new();
    let manifest = manifest();
    let mut registry = ShaderRegistry::new(BTreeMap::new());
    let mask = UniformMask::from_bits(0b101);

    let first = registry.get_or_create(&device, &manifest, "position", mask).unwrap();
    let second = registry.get_or_create(&device, &manifest, "position", mask).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(device.compile_calls.get(), 1);
    assert_eq!(registry.compiled_count(), 1);
    assert_eq!(first.name(), "position#5");
}

#[test]
fn every_mask_is_its_own_variant() {
    let device = MockDevice::new();
    let manifest = manifest();
    let mut registry = ShaderRegistry::new(BTreeMap::new());

    for bits in 0..4 {
        let mask = UniformMask::from_bits(bits);
        let a = registry.get_or_create(&device, &manifest, "fill", mask).unwrap();
        let b = registry.get_or_create(&device, &manifest, "fill", mask).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }
    assert_eq!(registry.len(), 4);
    assert_eq!(device.compile_calls.get(), 4);
}

#[test]
fn uniform_bits_become_defines() {
    let device = MockDevice::new();
    let manifest = manifest();
    let mut globals = BTreeMap::new();
    globals.insert("OVERDRAW_INSPECTOR".to_string(), "1".to_string());
    let mut registry = ShaderRegistry::new(globals);

    let mask = UniformMask::from_properties(&[false, true]);
    let program = registry.get_or_create(&device, &manifest, "fill", mask).unwrap();
    let defines = &program.program().defines;

    assert_eq!(defines.get("HAS_UNIFORM_u_opacity").map(String::as_str), Some("1"));
    assert!(!defines.contains_key("HAS_UNIFORM_u_color"));
    assert!(defines.contains_key("OVERDRAW_INSPECTOR"));
}

#[test]
fn attributes_resolve_to_buffer_indices() {
    let device = MockDevice::new();
    let manifest = manifest();
    let mut registry = ShaderRegistry::new(BTreeMap::new());

    let program = registry
        .get_or_create(&device, &manifest, "fill", UniformMask::NONE)
        .unwrap();

    assert_eq!(program.buffer_index("a_opacity"), Some(2));
    let color = program.attribute("a_color").unwrap();
    assert_eq!(color.index, 1);
    assert_eq!(color.stride, 16);
    assert_eq!(color.default.as_ref().map(Vec::len), Some(16));
    assert!(program.attribute("a_pos").unwrap().default.is_none());
}

#[test]
fn compile_failure_is_remembered() {
    let device = MockDevice::new();
    device.fail_shader("fill");
    let manifest = manifest();
    let mut registry = ShaderRegistry::new(BTreeMap::new());

    let first = registry.get_or_create(&device, &manifest, "fill", UniformMask::NONE);
    let second = registry.get_or_create(&device, &manifest, "fill", UniformMask::NONE);

    assert!(matches!(first, Err(ShaderError::Compilation { .. })));
    assert_eq!(second.unwrap_err(), ShaderError::Unusable("fill#0".to_string()));
    assert_eq!(device.compile_calls.get(), 1);
}

#[test]
fn mask_beyond_property_count_is_rejected() {
    let device = MockDevice::new();
    let manifest = manifest();
    let mut registry = ShaderRegistry::new(BTreeMap::new());

    let err = registry
        .get_or_create(&device, &manifest, "fill", UniformMask::from_bits(0b100))
        .unwrap_err();

    assert!(matches!(err, ShaderError::InvalidMask { properties: 2, .. }));
    assert_eq!(device.compile_calls.get(), 0);
}

#[test]
fn undeclared_attribute_makes_variant_unusable() {
    let device = MockDevice::new();
    let mut manifest = manifest();
    manifest
        .insert(
            ShaderSource::new("broken", "")
                .with_buffer_names(["a_pos"])
                .with_attribute("a_normal", AttributeFormat::Float3, None),
        )
        .unwrap();
    let mut registry = ShaderRegistry::new(BTreeMap::new());

    let err = registry
        .get_or_create(&device, &manifest, "broken", UniformMask::NONE)
        .unwrap_err();
    assert!(matches!(err, ShaderError::UndeclaredAttribute { ref attribute, .. } if attribute == "a_normal"));

    let unknown = registry.get_or_create(&device, &manifest, "missing", UniformMask::NONE);
    assert_eq!(unknown.unwrap_err(), ShaderError::UnknownShader("missing".into()));
}

#[test]
fn teardown_releases_programs() {
    let device = MockDevice::new();
    let manifest = manifest();
    let mut registry = ShaderRegistry::new(BTreeMap::new());
    let program = registry
        .get_or_create(&device, &manifest, "fill", UniformMask::NONE)
        .unwrap();

    registry.teardown();

    assert!(registry.is_empty());
    assert_eq!(Rc::strong_count(&program), 1);
    registry
        .get_or_create(&device, &manifest, "fill", UniformMask::NONE)
        .unwrap();
    assert_eq!(device.compile_calls.get(), 2);
}
