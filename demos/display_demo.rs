use std::fmt::Write;

use anyhow::{Context, Result};
use modulo::{Display, Knob, Port, PortConfig};

/// Shows the splash screen, then the knob position and the display buttons.
fn main() -> Result<()> {
    env_logger::init();

    let mut port =
        Port::open(&PortConfig::default()).context("Failed to open the Modulo Controller")?;
    let mut display = Display::new();
    display
        .on_button_press(|display, button| {
            display.clear();
            write!(display, "Button {} down", button).ok();
            display.refresh(false);
        })
        .on_button_release(|display, button| {
            display.clear();
            write!(display, "Button {} up", button).ok();
            display.refresh(false);
        });
    let display = port.attach(display);

    let mut screen = port.device(display).context("Display was detached")?;
    screen.device_id().context("No display connected")?;
    screen.draw_splash_screen();
    screen.refresh(false);

    let knob = port.attach(Knob::new());
    loop {
        if !port.run_once(false) {
            continue;
        }
        let position = match port.device(knob) {
            Some(knob) => knob.position(),
            None => continue,
        };
        if let Some(mut screen) = port.device(display) {
            screen.clear();
            screen.set_text_size(2);
            write!(screen, "Knob\n{}", position)?;
            screen.refresh(false);
        }
    }
}
