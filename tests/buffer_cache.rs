mod support;

use std::rc::Rc;

use support::MockDevice;
use wgpu_drawables::renderer::{BufferCache, BufferKind, BufferRequest, BufferUsage};
use wgpu_drawables::DeviceError;

fn request() -> BufferRequest<'static> {
    BufferRequest {
        label: "tile",
        kind: BufferKind::Vertex,
        usage: BufferUsage::StaticDraw,
    }
}

#[test]
fn smaller_write_reuses_resource() {
    let device = MockDevice::new();
    let mut cache = BufferCache::new(1);
    let mut slot = None;

    let first = cache
        .acquire(&device, &mut slot, &[1u8; 64], true, request())
        .unwrap()
        .unwrap();
    let second = cache
        .acquire(&device, &mut slot, &[2u8; 48], true, request())
        .unwrap()
        .unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(second.capacity(), 64);
    assert_eq!(device.buffers_created.get(), 1);
    assert_eq!(device.buffer_updates.get(), 1);
    assert_eq!(&second.raw().contents.borrow()[..48], &[2u8; 48][..]);
}

#[test]
fn larger_write_replaces_resource() {
    let device = MockDevice::new();
    let mut cache = BufferCache::new(1);
    let mut slot = None;

    let first = cache
        .acquire(&device, &mut slot, &[1u8; 64], true, request())
        .unwrap()
        .unwrap();
    let second = cache
        .acquire(&device, &mut slot, &[2u8; 128], true, request())
        .unwrap()
        .unwrap();

    assert!(!Rc::ptr_eq(&first, &second));
    assert_ne!(first.id(), second.id());
    assert_eq!(second.capacity(), 128);
    assert_eq!(device.buffers_created.get(), 2);
    assert_eq!(cache.stats().retired, 1);

    // Only this test and the retire list still hold the old buffer.
    drop(second);
    assert_eq!(Rc::strong_count(&first), 2);
}

#[test]
fn clean_data_is_not_rewritten() {
    let device = MockDevice::new();
    let mut cache = BufferCache::new(1);
    let mut slot = None;

    cache.acquire(&device, &mut slot, &[7u8; 16], true, request()).unwrap();
    cache.acquire(&device, &mut slot, &[7u8; 16], false, request()).unwrap();

    assert_eq!(device.buffer_updates.get(), 0);
    assert_eq!(cache.stats().reused, 1);
}

#[test]
fn empty_contents_yield_no_buffer() {
    let device = MockDevice::new();
    let mut cache = BufferCache::new(1);
    let mut slot = None;

    let acquired = cache.acquire(&device, &mut slot, &[], true, request()).unwrap();

    assert!(acquired.is_none());
    assert!(slot.is_none());
    assert_eq!(device.buffers_created.get(), 0);
}

#[test]
fn allocation_failure_leaves_slot_untouched() {
    let device = MockDevice::new();
    let mut cache = BufferCache::new(1);
    let mut slot = None;
    let first = cache
        .acquire(&device, &mut slot, &[1u8; 8], true, request())
        .unwrap()
        .unwrap();

    device.fail_allocations.set(true);
    let err = cache
        .acquire(&device, &mut slot, &[1u8; 32], true, request())
        .unwrap_err();

    assert!(matches!(err, DeviceError::BufferAllocation(_)));
    assert!(Rc::ptr_eq(slot.as_ref().unwrap(), &first));
    assert_eq!(cache.pending_release(), 0);
}

#[test]
fn retired_buffers_wait_for_delay_and_last_reference() {
    let device = MockDevice::new();
    let mut cache = BufferCache::new(2);
    let mut slot = None;

    let old = cache
        .acquire(&device, &mut slot, &[0u8; 4], true, request())
        .unwrap()
        .unwrap();
    cache.acquire(&device, &mut slot, &[0u8; 8], true, request()).unwrap();
    assert_eq!(cache.pending_release(), 1);

    assert_eq!(cache.finish_frame(), 0);
    assert_eq!(cache.finish_frame(), 0, "still referenced by `old`");

    drop(old);
    assert_eq!(cache.finish_frame(), 1);
    assert_eq!(cache.pending_release(), 0);
    assert_eq!(cache.stats().released, 1);
}
