mod common;

use common::*;
use modulo::{DeviceId, Display, Knob, Port, StatusLed};

const KNOB: &str = "co.modulo.knob";
const DISPLAY: &str = "co.modulo.display";

#[test]
fn test_enumeration() {
    let controller = Controller::new(vec![
        Peripheral::new(12, KNOB),
        Peripheral::new(5, DISPLAY),
    ]);
    let mut port = open_port(&controller);

    assert_eq!(port.device_ids(), vec![DeviceId(5), DeviceId(12)]);
    assert_eq!(port.device_type(DeviceId(12)).as_deref(), Some(KNOB));
    assert_eq!(port.device_type(DeviceId(5)).as_deref(), Some(DISPLAY));
    assert_eq!(port.device_type(DeviceId(7)), None);
    assert_eq!(port.version(DeviceId(5)), Some(0x0102));
    assert_eq!(port.version(DeviceId(7)), None);

    port.set_status_led(DeviceId(12), StatusLed::Blinking);
    assert_eq!(controller.borrow().peripheral(12).status_led, 2);
}

#[test]
fn test_empty_bus() {
    let controller = Controller::new(vec![]);
    let mut port = open_port(&controller);
    assert!(port.device_ids().is_empty());

    let knob = port.attach(Knob::new());
    assert!(!port.run_once(true));
    let mut knob = port.device(knob).unwrap();
    assert_eq!(knob.address(), None);
    assert_eq!(knob.device_id(), None);
    assert_eq!(knob.transfer(0, &[], 1), None);
}

#[test]
fn test_addresses_are_unique() {
    let controller = Controller::new(vec![
        Peripheral::new(5, KNOB),
        Peripheral::new(6, DISPLAY),
        Peripheral::new(7, KNOB),
    ]);
    let mut port = open_port(&controller);
    let fixed = port.attach_with_id(Knob::new(), DeviceId(7));
    let first = port.attach(Knob::new());
    let extra = port.attach(Knob::new());
    let display = port.attach(Display::new());
    port.run_once(true);

    let mut fixed = port.device(fixed).unwrap();
    assert_eq!(fixed.device_id(), Some(DeviceId(7)));
    assert_eq!(fixed.address().map(|a| *a), Some(10));

    // the first knob nobody claimed
    let mut first = port.device(first).unwrap();
    assert_eq!(first.device_id(), Some(DeviceId(5)));
    assert_eq!(first.address().map(|a| *a), Some(11));

    let mut extra = port.device(extra).unwrap();
    assert_eq!(extra.device_id(), None);
    assert_eq!(extra.address(), None);

    assert_eq!(port.device(display).unwrap().address().map(|a| *a), Some(12));

    let controller = controller.borrow();
    assert_eq!(controller.peripheral(7).address, 10);
    assert_eq!(controller.peripheral(5).address, 11);
    assert_eq!(controller.peripheral(6).address, 12);
}

#[test]
fn test_global_reset_is_idempotent() {
    let controller = Controller::new(vec![Peripheral::new(5, KNOB), Peripheral::new(7, KNOB)]);
    let mut port = open_port(&controller);
    let a = port.attach(Knob::new());
    let b = port.attach(Knob::new());
    port.run_once(true);
    assert_eq!(controller.borrow().peripheral(7).address, 11);

    port.global_reset();
    let before = port.device_ids();
    port.global_reset();
    port.global_reset();
    assert_eq!(port.device_ids(), before);
    assert_eq!(before, vec![DeviceId(5), DeviceId(7)]);
    assert_eq!(controller.borrow().broadcasts(0), 4);
    for p in controller.borrow().peripherals.iter() {
        assert_eq!(p.address, 0);
    }
    assert_eq!(port.device(a).unwrap().context().record().unwrap().address(), None);

    // addresses are handed out from the start again
    port.run_once(true);
    assert_eq!(port.device(a).unwrap().address().map(|a| *a), Some(10));
    assert_eq!(port.device(b).unwrap().address().map(|a| *a), Some(11));
}

#[test]
fn test_reported_addresses_are_kept() {
    let controller = Controller::new(vec![
        Peripheral::new(5, KNOB).with_address(40),
        Peripheral::new(6, KNOB),
    ]);
    init_logger();
    let mut port = Port::with_link(Controller::link(&controller), false).unwrap();
    assert_eq!(controller.borrow().broadcasts(0), 0);
    assert_eq!(
        port.bus_mut().next_unassigned_device_id(DeviceId(0)),
        Some(DeviceId(6))
    );

    let a = port.attach(Knob::new());
    let b = port.attach(Knob::new());
    port.run_once(true);
    assert_eq!(port.device(a).unwrap().address().map(|a| *a), Some(40));
    assert_eq!(port.device(b).unwrap().address().map(|a| *a), Some(41));

    let set_address: Vec<_> = controller
        .borrow()
        .transfers_to(9)
        .into_iter()
        .filter(|(command, _)| *command == 3)
        .map(|(_, data)| data)
        .collect();
    assert_eq!(set_address, vec![vec![6, 0, 41]]);
}

#[test]
fn test_addresses_held_by_other_peripherals_are_skipped() {
    // left over from an earlier session that wasn't reset
    let controller = Controller::new(vec![
        Peripheral::new(5, KNOB),
        Peripheral::new(6, KNOB).with_address(10),
        Peripheral::new(7, KNOB).with_address(11),
    ]);
    init_logger();
    let mut port = Port::with_link(Controller::link(&controller), false).unwrap();
    let knob = port.attach_with_id(Knob::new(), DeviceId(5));
    port.run_once(true);

    assert_eq!(port.device(knob).unwrap().address().map(|a| *a), Some(12));
    let controller = controller.borrow();
    assert_eq!(controller.peripheral(5).address, 12);
    assert_eq!(controller.peripheral(6).address, 10);
    assert_eq!(controller.peripheral(7).address, 11);
}

#[test]
fn test_lost_contact_reassigns_address() {
    let controller = Controller::new(vec![Peripheral::new(5, KNOB)]);
    let mut port = open_port(&controller);
    let knob = port.attach(Knob::new());
    port.run_once(true);
    assert_eq!(controller.borrow().peripheral(5).address, 10);

    // the peripheral lost its address, e.g. after a power cycle
    controller.borrow_mut().peripheral_mut(5).address = 0;
    let mut device = port.device(knob).unwrap();
    device.set_color(1.0, 0.0, 0.0);
    assert_eq!(device.context().record().unwrap().address(), None);

    port.run_once(true);
    assert_eq!(port.device(knob).unwrap().address().map(|a| *a), Some(11));
    assert_eq!(controller.borrow().peripheral(5).address, 11);
}

#[test]
fn test_rebind_device() {
    let controller = Controller::new(vec![Peripheral::new(5, KNOB), Peripheral::new(8, KNOB)]);
    let mut port = open_port(&controller);
    let knob = port.attach(Knob::new());
    let mut device = port.device(knob).unwrap();
    assert_eq!(device.device_id(), Some(DeviceId(5)));

    device.set_device_id(DeviceId(8));
    assert_eq!(device.context().record().unwrap().address(), None);
    assert_eq!(device.device_id(), Some(DeviceId(8)));
    assert_eq!(device.address().map(|a| *a), Some(11));
}
