use anyhow::{Context, Result};
use modulo::{Knob, LinkConfig, Port, PortConfig};

/// Turn the knob to change its color, press it to print the position.
/// An optional argument names the serial port of the controller.
fn main() -> Result<()> {
    env_logger::init();

    let mut link = LinkConfig::default();
    if let Some(path) = std::env::args().nth(1) {
        link = link.path(path);
    }
    let config = PortConfig {
        link,
        ..Default::default()
    };
    let mut port = Port::open(&config).context("Failed to open the Modulo Controller")?;

    for device_id in port.device_ids() {
        let device_type = port.device_type(device_id).unwrap_or_default();
        println!("Found {} ({})", device_type, device_id);
    }

    let mut knob = Knob::new();
    knob.on_position_change(|knob| {
        let hue = knob.angle() / 360.0;
        knob.set_hsv(hue, 1.0, 1.0);
    })
    .on_press(|knob| println!("Pressed at position {}", knob.position()))
    .on_release(|_| println!("Released"));
    let handle = port.attach(knob);

    port.device(handle)
        .and_then(|mut knob| knob.device_id())
        .context("No knob connected")?;

    port.run_forever()
}
