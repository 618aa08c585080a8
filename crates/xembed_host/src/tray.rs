use x11rb::protocol::{xproto::*, Event};

use crate::{
    assembler::MessageAssembler,
    atoms::TrayAtoms,
    queue::{AdvanceReason, DisplayQueue},
    registry::DockRegistry,
    shell::{Shell, TimerId},
};

/// Opcodes carried in `data.l[1]` of a `_NET_SYSTEM_TRAY_OPCODE` message.
pub const SYSTEM_TRAY_REQUEST_DOCK: u32 = 0;
pub const SYSTEM_TRAY_BEGIN_MESSAGE: u32 = 1;
pub const SYSTEM_TRAY_CANCEL_MESSAGE: u32 = 2;

/// What [`Tray::dispatch`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The event belonged to the tray protocol and was consumed.
    Handled,
    /// Not a tray event; the caller may hand it to other consumers.
    Ignored,
    /// The manager selection was revoked. Tray state has already been torn
    /// down; the caller must release the selection and stop dispatching.
    OwnershipLost,
}

/// The tray protocol engine for one screen: the docked-client set, balloon
/// reassembly, and the balloon display queue, driven from the event loop
/// through [`Tray::dispatch`].
#[derive(Debug)]
pub struct Tray {
    atoms: TrayAtoms,
    registry: DockRegistry,
    assembler: MessageAssembler,
    queue: DisplayQueue,
}

impl Tray {
    pub fn new(atoms: TrayAtoms) -> Self {
        Tray { atoms, registry: DockRegistry::new(), assembler: MessageAssembler::new(), queue: DisplayQueue::new() }
    }

    pub fn registry(&self) -> &DockRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &DisplayQueue {
        &self.queue
    }

    /// Route one inbound X event.
    ///
    /// Client destruction is detected through `DestroyNotify` rather than the
    /// embedding side's "plug removed" signal, which misses clients that
    /// disconnect within a few milliseconds of mapping.
    pub fn dispatch(&mut self, event: &Event, shell: &mut dyn Shell) -> Dispatch {
        match event {
            Event::ClientMessage(ev) if ev.type_ == self.atoms.opcode && ev.format == 32 => {
                self.handle_opcode(ev, shell);
                Dispatch::Handled
            }
            Event::ClientMessage(ev) if ev.type_ == self.atoms.message_data => {
                self.handle_message_data(ev, shell);
                Dispatch::Handled
            }
            Event::DestroyNotify(ev) => {
                let was_client = self.registry.on_window_destroyed(ev.window, shell);
                self.assembler.on_window_destroyed(ev.window);
                self.queue.on_window_destroyed(ev.window, shell);
                if was_client {
                    Dispatch::Handled
                } else {
                    Dispatch::Ignored
                }
            }
            Event::SelectionClear(ev) if ev.selection == self.atoms.selection => {
                self.shutdown(shell);
                Dispatch::OwnershipLost
            }
            _ => Dispatch::Ignored,
        }
    }

    fn handle_opcode(&mut self, ev: &ClientMessageEvent, shell: &mut dyn Shell) {
        let data = ev.data.as_data32();
        match data[1] {
            SYSTEM_TRAY_REQUEST_DOCK => {
                self.registry.request_dock(data[2], shell);
            }
            SYSTEM_TRAY_BEGIN_MESSAGE => {
                // Balloon messages from windows that never docked are a
                // protocol violation and are dropped.
                if !self.registry.contains(ev.window) {
                    log::warn!("balloon message from undocked window {:#x}", ev.window);
                    return;
                }
                let (timeout_ms, total_length, id) = (data[2], data[3] as usize, data[4]);
                if let Some(balloon) = self.assembler.begin(ev.window, id, total_length, timeout_ms) {
                    self.queue.enqueue(balloon, shell);
                }
            }
            SYSTEM_TRAY_CANCEL_MESSAGE => {
                let id = data[2];
                self.assembler.cancel(ev.window, id);
                self.queue.cancel(ev.window, id, shell);
            }
            opcode => {
                log::warn!("unknown tray opcode {} from window {:#x}", opcode, ev.window);
            }
        }
    }

    fn handle_message_data(&mut self, ev: &ClientMessageEvent, shell: &mut dyn Shell) {
        let chunk = ev.data.as_data8();
        if let Some(balloon) = self.assembler.append(ev.window, &chunk) {
            // The sender may have disappeared between begin and the last
            // chunk; a balloon from a gone client is silently dropped.
            if self.registry.contains(ev.window) {
                self.queue.enqueue(balloon, shell);
            } else {
                log::debug!("dropping completed balloon from vanished window {:#x}", ev.window);
            }
        }
    }

    /// The user clicked the balloon popup.
    pub fn balloon_dismissed(&mut self, shell: &mut dyn Shell) {
        self.queue.advance(AdvanceReason::UserDismissed, shell);
    }

    /// The shell's one-shot balloon timer fired.
    pub fn balloon_timeout(&mut self, timer: TimerId, shell: &mut dyn Shell) {
        self.queue.on_timeout(timer, shell);
    }

    /// Drop all tray state: close and cancel the displayed balloon, discard
    /// queued and in-flight messages, release every embedding surface.
    pub fn shutdown(&mut self, shell: &mut dyn Shell) {
        self.queue.clear(shell);
        self.assembler.clear();
        self.registry.clear(shell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::mock::{MockShell, ShellCall};
    use pretty_assertions::assert_eq;

    const ATOMS: TrayAtoms =
        TrayAtoms { selection: 101, manager: 102, opcode: 103, message_data: 104, orientation: 105, cardinal: 6 };

    fn opcode_msg(window: Window, data: [u32; 5]) -> Event {
        Event::ClientMessage(ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_: ATOMS.opcode,
            data: data.into(),
        })
    }

    fn dock_msg(window: Window) -> Event {
        opcode_msg(window, [0, SYSTEM_TRAY_REQUEST_DOCK, window, 0, 0])
    }

    fn begin_msg(window: Window, id: u32, len: u32, timeout_ms: u32) -> Event {
        opcode_msg(window, [0, SYSTEM_TRAY_BEGIN_MESSAGE, timeout_ms, len, id])
    }

    fn cancel_msg(window: Window, id: u32) -> Event {
        opcode_msg(window, [0, SYSTEM_TRAY_CANCEL_MESSAGE, id, 0, 0])
    }

    fn data_msg(window: Window, chunk: &[u8]) -> Event {
        assert!(chunk.len() <= 20);
        let mut bytes = [0u8; 20];
        bytes[..chunk.len()].copy_from_slice(chunk);
        Event::ClientMessage(ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 8,
            sequence: 0,
            window,
            type_: ATOMS.message_data,
            data: bytes.into(),
        })
    }

    fn destroy_msg(window: Window) -> Event {
        Event::DestroyNotify(DestroyNotifyEvent { response_type: DESTROY_NOTIFY_EVENT, sequence: 0, event: window, window })
    }

    fn send_text(tray: &mut Tray, shell: &mut MockShell, window: Window, id: u32, text: &str, timeout_ms: u32) {
        assert_eq!(tray.dispatch(&begin_msg(window, id, text.len() as u32, timeout_ms), shell), Dispatch::Handled);
        for chunk in text.as_bytes().chunks(20) {
            assert_eq!(tray.dispatch(&data_msg(window, chunk), shell), Dispatch::Handled);
        }
    }

    #[test]
    fn chunked_balloon_is_displayed_once_after_the_last_chunk() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);

        let text = "a rather long notification that needs three chunks!";
        assert!(text.len() > 40 && text.len() < 60);
        send_text(&mut tray, &mut shell, 0x42, 1, text, 2500);

        assert_eq!(shell.shown(), vec![text]);
        assert_eq!(tray.queue().len(), 1);
        assert!(shell.calls.contains(&ShellCall::StartTimer(crate::TimerId(0), 2500)));
    }

    #[test]
    fn zero_length_balloon_is_enqueued_at_begin() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        tray.dispatch(&begin_msg(0x42, 1, 0, 0), &mut shell);
        assert_eq!(shell.shown(), vec![""]);
    }

    #[test]
    fn duplicate_dock_request_is_ignored() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        assert_eq!(tray.registry().len(), 1);
        assert_eq!(shell.calls, vec![ShellCall::Embed(0x42)]);
    }

    #[test]
    fn begin_from_undocked_window_is_dropped() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&begin_msg(0x42, 1, 0, 0), &mut shell);
        assert_eq!(shell.shown(), Vec::<&str>::new());
    }

    #[test]
    fn cancel_of_a_pending_message_prevents_display() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        tray.dispatch(&begin_msg(0x42, 9, 30, 0), &mut shell);
        tray.dispatch(&data_msg(0x42, b"first twenty bytes.."), &mut shell);
        tray.dispatch(&cancel_msg(0x42, 9), &mut shell);
        tray.dispatch(&data_msg(0x42, b"last ten.."), &mut shell);
        assert_eq!(shell.shown(), Vec::<&str>::new());
        assert!(tray.queue().is_empty());
    }

    #[test]
    fn balloon_completing_after_undock_is_discarded() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        tray.dispatch(&begin_msg(0x42, 1, 5, 0), &mut shell);
        tray.dispatch(&destroy_msg(0x42), &mut shell);
        tray.dispatch(&data_msg(0x42, b"hello"), &mut shell);
        assert_eq!(shell.shown(), Vec::<&str>::new());
    }

    #[test]
    fn destroying_the_displayed_windows_client_advances_the_queue() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        tray.dispatch(&dock_msg(0x43), &mut shell);
        send_text(&mut tray, &mut shell, 0x42, 1, "going away", 5000);
        send_text(&mut tray, &mut shell, 0x43, 1, "survivor", 0);
        let timer = shell.pending_timer.unwrap();

        assert_eq!(tray.dispatch(&destroy_msg(0x42), &mut shell), Dispatch::Handled);
        assert!(shell.calls.contains(&ShellCall::CancelTimer(timer)));
        assert_eq!(shell.shown(), vec!["going away", "survivor"]);
        assert_eq!(tray.queue().len(), 1);
        assert_eq!(tray.registry().len(), 1);
    }

    #[test]
    fn fifo_order_is_kept_across_clients() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        tray.dispatch(&dock_msg(0x43), &mut shell);
        send_text(&mut tray, &mut shell, 0x42, 1, "a", 0);
        // Zero-length messages enter the queue at their begin event,
        // interleaved with everyone else's completions.
        tray.dispatch(&begin_msg(0x43, 1, 0, 0), &mut shell);
        send_text(&mut tray, &mut shell, 0x42, 2, "c", 0);

        tray.balloon_dismissed(&mut shell);
        tray.balloon_dismissed(&mut shell);
        assert_eq!(shell.shown(), vec!["a", "", "c"]);
    }

    #[test]
    fn selection_clear_tears_everything_down() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        tray.dispatch(&dock_msg(0x42), &mut shell);
        send_text(&mut tray, &mut shell, 0x42, 1, "doomed", 3000);
        tray.dispatch(&begin_msg(0x42, 2, 10, 0), &mut shell);

        let clear = Event::SelectionClear(SelectionClearEvent {
            response_type: SELECTION_CLEAR_EVENT,
            sequence: 0,
            time: 0,
            owner: 0x1,
            selection: ATOMS.selection,
        });
        assert_eq!(tray.dispatch(&clear, &mut shell), Dispatch::OwnershipLost);
        assert!(tray.queue().is_empty());
        assert!(tray.registry().is_empty());
        assert!(!shell.balloon_visible);
        assert_eq!(shell.pending_timer, None);
        assert!(shell.calls.contains(&ShellCall::Remove(crate::SocketId(0), 0x42)));
    }

    #[test]
    fn unrelated_events_pass_through() {
        let mut shell = MockShell::default();
        let mut tray = Tray::new(ATOMS);
        let other = Event::ClientMessage(ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window: 0x42,
            type_: 999,
            data: [0u32; 5].into(),
        });
        assert_eq!(tray.dispatch(&other, &mut shell), Dispatch::Ignored);
        assert_eq!(tray.dispatch(&destroy_msg(0x77), &mut shell), Dispatch::Ignored);
        assert!(shell.calls.is_empty());
    }
}
