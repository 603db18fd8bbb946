//! Video service tests against the recording backend

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use kmsvideo::constants::{PROP_SET_PLANE_FB, PROP_SET_SCALING, PROP_SET_Z_ORDER};
use kmsvideo::drm::{Rect, Size, WindowId};
use kmsvideo::{DisplayError, VideoService};

const MAIN: WindowId = WindowId(0);
const SUB: WindowId = WindowId(1);

fn service_with(fake: FakeBackend, min: Size, max: Size) -> VideoService<FakeBackend> {
    match VideoService::new(table(fake, max), capability(min, max)) {
        Ok(service) => service,
        Err(e) => panic!("service setup failed: {}", e),
    }
}

fn service() -> VideoService<FakeBackend> {
    service_with(
        FakeBackend::single_display(),
        Size::new(640, 480),
        Size::new(1920, 1080),
    )
}

fn fake(service: &VideoService<FakeBackend>) -> &FakeBackend {
    service.devices().primary().unwrap().backend()
}

fn fake_mut(service: &mut VideoService<FakeBackend>) -> &mut FakeBackend {
    service.devices_mut().primary_mut().unwrap().backend_mut()
}

fn last_mode(service: &VideoService<FakeBackend>) -> Option<String> {
    fake(service).mode_sets().last().map(|call| match call {
        Call::SetCrtc { mode, .. } => mode.clone(),
        _ => unreachable!(),
    })
}

// ========== Startup ==========

#[test]
fn test_startup_sets_initial_mode() {
    let service = service();
    assert_eq!(fake(&service).mode_sets().len(), 1);
    assert_eq!(last_mode(&service).as_deref(), Some("1920x1080@60"));
    assert_eq!(service.display_resolution(), Rect::new(0, 0, 1920, 1080));
}

#[test]
fn test_windows_follow_sorted_plane_names() {
    let service = service();
    let planes = service.video_planes();
    assert_eq!(planes.len(), 2);
    assert_eq!((planes[0].wid, planes[0].name.as_str()), (MAIN, "MAIN"));
    assert_eq!((planes[1].wid, planes[1].name.as_str()), (SUB, "SUB"));
    assert_eq!(planes[0].min, Size::new(640, 480));
    assert_eq!(planes[0].max, Size::new(1920, 1080));
    assert_eq!(service.physical_planes(), &[61, 62]);
    assert_eq!(service.sink(SUB).map(|s| s.plane_id), Some(62));
}

#[test]
fn test_missing_dumb_buffers_fails_startup() {
    let mut fake = FakeBackend::single_display();
    fake.dumb_buffers = false;
    let max = Size::new(1920, 1080);
    let Err(err) = VideoService::new(table(fake, max), capability(Size::default(), max)) else {
        panic!("startup should fail");
    };
    assert!(err.is_fatal());
}

// ========== Resolution ==========

#[test]
fn test_out_of_bounds_resolution_rejected() {
    let mut service = service();
    for size in [Size::new(3840, 2160), Size::new(320, 240), Size::new(1920, 2000)] {
        let err = service.set_display_resolution(size).unwrap_err();
        assert!(matches!(err, DisplayError::OutOfBounds { requested, .. } if requested == size));
    }
    assert_eq!(fake(&service).mode_sets().len(), 1);
    assert_eq!(service.display_resolution(), Rect::new(0, 0, 1920, 1080));
}

#[test]
fn test_resolution_change() {
    let mut service = service();
    service.set_display_resolution(Size::new(1280, 720)).unwrap();
    assert_eq!(last_mode(&service).as_deref(), Some("1280x720@60"));
    assert_eq!(service.display_resolution(), Rect::new(0, 0, 1280, 720));
    assert_eq!(service.devices().configured_size(), Size::new(1280, 720));

    service.set_display_mode(Size::new(1280, 720), 50).unwrap();
    assert_eq!(last_mode(&service).as_deref(), Some("1280x720@50"));
}

#[test]
fn test_unsupported_resolution_keeps_mode() {
    let mut service = service();
    let err = service.set_display_resolution(Size::new(1024, 768)).unwrap_err();
    assert!(matches!(err, DisplayError::UnsupportedMode { connector: CONNECTOR, .. }));
    assert!(!err.is_not_found());
    assert_eq!(service.display_resolution(), Rect::new(0, 0, 1920, 1080));
    assert_eq!(service.devices().configured_size(), Size::new(1920, 1080));
}

#[test]
fn test_supported_resolutions_unique_and_bounded() {
    let service = service();
    assert_eq!(
        service.get_supported_resolutions(),
        vec![Size::new(1920, 1080), Size::new(1280, 720), Size::new(640, 480)]
    );

    let narrow = service_with(
        FakeBackend::single_display(),
        Size::new(800, 600),
        Size::new(1920, 1080),
    );
    assert_eq!(
        narrow.get_supported_resolutions(),
        vec![Size::new(1920, 1080), Size::new(1280, 720)]
    );
    assert_eq!(
        narrow.video_capabilities(),
        (Size::new(800, 600), Size::new(1920, 1080))
    );
}

// ========== Windows ==========

#[test]
fn test_connect_disconnect_round_trip() {
    let mut service = service();
    assert_eq!(service.connect(MAIN).unwrap(), 61);
    assert!(service.sink(MAIN).unwrap().connected);

    service.disconnect(MAIN).unwrap();
    assert!(!service.sink(MAIN).unwrap().connected);
    assert_eq!(service.physical_planes(), &[61, 62]);
    assert_eq!(
        fake(&service).calls.last(),
        Some(&Call::SetProperty {
            plane: 61,
            property: PROP_SET_PLANE_FB,
            value: 0,
        })
    );

    assert!(matches!(service.disconnect(MAIN), Err(DisplayError::SinkNotConnected(MAIN))));
    assert!(matches!(
        service.connect(WindowId(5)),
        Err(DisplayError::InvalidWindow(WindowId(5)))
    ));
}

#[test]
fn test_failed_disconnect_keeps_sink() {
    let mut service = service();
    service.connect(SUB).unwrap();
    fake_mut(&mut service).fail_set_property = true;
    assert!(service.disconnect(SUB).is_err());
    assert!(service.sink(SUB).unwrap().connected);
}

#[test]
fn test_z_order_packed_on_first_plane() {
    let mut service = service();
    service.set_composition_params(&[SUB, MAIN]).unwrap();
    assert_eq!(
        fake(&service).calls.last(),
        Some(&Call::SetProperty {
            plane: 61,
            property: PROP_SET_Z_ORDER,
            value: 0x0001_0000,
        })
    );

    let calls = fake(&service).calls.len();
    assert!(matches!(
        service.set_composition_params(&[MAIN, WindowId(9)]),
        Err(DisplayError::InvalidWindow(WindowId(9)))
    ));
    assert!(matches!(
        service.set_composition_params(&[MAIN, SUB, MAIN, SUB, MAIN]),
        Err(DisplayError::ZOrderOverflow(5))
    ));
    assert_eq!(fake(&service).calls.len(), calls);
}

#[test]
fn test_scaling_needs_connected_window() {
    let mut service = service();
    let input = Rect::new(0, 0, 1920, 1080);
    let output = Rect::new(100, 100, 960, 540);
    assert!(matches!(
        service.apply_scaling(MAIN, input, input, output),
        Err(DisplayError::SinkNotConnected(MAIN))
    ));

    service.connect(MAIN).unwrap();
    service.apply_scaling(MAIN, input, input, output).unwrap();
    assert!(matches!(
        fake(&service).calls.last(),
        Some(Call::SetProperty { plane: 61, property: PROP_SET_SCALING, .. })
    ));

    fake_mut(&mut service).fail_set_property = true;
    assert!(service.apply_scaling(MAIN, input, input, output).is_err());
}

#[test]
fn test_blanking() {
    let mut service = service();
    let rect = Rect::new(0, 0, 640, 480);
    assert!(service.set_window_blanking(SUB, true, rect, rect).is_err());

    service.connect(SUB).unwrap();
    service.set_window_blanking(SUB, true, rect, rect).unwrap();
    service.set_window_blanking(SUB, false, rect, rect).unwrap();
    let scaling_calls = fake(&service)
        .calls
        .iter()
        .filter(|c| matches!(c, Call::SetProperty { plane: 62, property: PROP_SET_SCALING, .. }))
        .count();
    assert_eq!(scaling_calls, 2);
}

#[test]
fn test_set_plane_converts_source_to_fixed_point() {
    let mut service = service();
    let dst = Rect::new(-10, 0, 640, 480);
    service
        .set_plane(SUB, 200, dst, Rect::new(0, 0, 1920, 1080))
        .unwrap();
    assert_eq!(
        fake(&service).calls.last(),
        Some(&Call::SetPlane {
            plane: 62,
            crtc: CRTC,
            fb_id: 200,
            dst,
            src: (0, 0, 1920 << 16, 1080 << 16),
        })
    );
}

// ========== Hotplug ==========

#[test]
fn test_hotplug_notifies_only_on_change() {
    let mut service = service();
    let seen: Rc<RefCell<Vec<(Size, Size)>>> = Rc::default();
    let sink = Rc::clone(&seen);
    service.set_observer(Box::new(move |min: Size, max: Size| {
        sink.borrow_mut().push((min, max));
    }));

    // Smaller monitor
    fake_mut(&mut service).plug(modes(&[(1280, 720, 60), (800, 600, 60)]));
    service.handle_hotplug(NODE);
    assert_eq!(*seen.borrow(), vec![(Size::new(800, 600), Size::new(1280, 720))]);
    assert_eq!(last_mode(&service).as_deref(), Some("1280x720@60"));
    assert_eq!(service.video_planes()[0].max, Size::new(1280, 720));
    assert_eq!(service.video_planes()[0].min, Size::new(800, 600));

    // Nothing changed
    service.handle_hotplug(NODE);
    assert_eq!(seen.borrow().len(), 1);

    // Unplugged: no notification, no mode-set
    let mode_sets = fake(&service).mode_sets().len();
    fake_mut(&mut service).unplug();
    service.handle_hotplug(NODE);
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(fake(&service).mode_sets().len(), mode_sets);

    // Same monitor back
    fake_mut(&mut service).plug(modes(&[(1280, 720, 60), (800, 600, 60)]));
    service.handle_hotplug(NODE);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn test_hotplug_on_unknown_node_ignored() {
    let mut service = service();
    let seen = Rc::new(RefCell::new(0));
    let count = Rc::clone(&seen);
    service.set_observer(Box::new(move |_: Size, _: Size| *count.borrow_mut() += 1));

    fake_mut(&mut service).plug(modes(&[(1280, 720, 60)]));
    service.handle_hotplug("/dev/dri/card7");
    assert_eq!(*seen.borrow(), 0);
    assert_eq!(fake(&service).mode_sets().len(), 1);
}

#[test]
fn test_device_update_clamps_to_capability() {
    let mut service = service();
    service.handle_device_update(Size::new(320, 200), Size::new(3840, 2160));
    for plane in service.video_planes() {
        assert_eq!(plane.min, Size::new(640, 480));
        assert_eq!(plane.max, Size::new(1920, 1080));
    }
}
