//! The Host Bridge: the thin seam between the CPU's run loop and whatever
//! terminal/keyboard front-end embeds it. The front-end (a raw-mode tty
//! reader, a TUI renderer) is out of scope here; only the interface is.

use crate::cpu::Cpu;

/// Addresses of the 4-nibble keyboard bitmap (16 key bits). A host's
/// `update` hook writes here and asserts the Interrupt flag when the
/// bitmap changes.
pub const KEYBOARD_MMIO_START: u16 = 0xFFF0;
pub const KEYBOARD_MMIO_END: u16 = 0xFFF3;

/// Hooks the CPU's run loop invokes: once at start, once per instruction
/// boundary, and once at teardown. All three are optional — the default
/// implementations are no-ops, matching the "three optional function-value
/// hooks" described for the host bridge.
pub trait HostBridge {
    fn setup(&mut self, _cpu: &mut Cpu) {}
    fn update(&mut self, _cpu: &mut Cpu) {}
    fn teardown(&mut self, _cpu: &mut Cpu) {}
}

/// A host bridge that never touches the keyboard band and never halts or
/// interrupts the machine on its own. Used by `bbb run` since the real
/// tty/TUI front-end is out of scope for this crate.
pub struct HeadlessBridge;

impl HostBridge for HeadlessBridge {}
