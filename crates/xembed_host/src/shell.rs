use x11rb::protocol::xproto::Window;

/// Handle for one embedding surface created by the shell. Opaque to the
/// engine; the shell maps it back to whatever it allocated (an X socket
/// window, a GTK socket, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SocketId(pub u64);

/// Handle for a one-shot balloon timeout scheduled by the shell. A fresh id
/// is handed out per `start_timer` call, so a stale expiration (timer fired
/// after the balloon was already dismissed) can be told apart from the live
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(pub u64);

/// The GUI side of the tray. The engine calls into this for everything
/// visible; it never owns a widget or an X window for display itself.
///
/// All calls happen synchronously on the event loop thread. None of them may
/// block, and none of them may re-enter the engine.
pub trait Shell {
    /// A previously unseen client asked to be docked. Create an embedding
    /// surface for `window` and graft the client into it.
    ///
    /// Returns `None` when the client window vanished before the embed
    /// could complete. No surface may be left behind in that case, and the
    /// registry will not track the client: a dead window can never deliver
    /// the `DestroyNotify` that would otherwise clean the entry up.
    fn embed_icon(&mut self, window: Window) -> Option<SocketId>;

    /// The client behind `socket` is gone (or the tray is shutting down).
    /// Tear down its embedding surface.
    fn remove_icon(&mut self, socket: SocketId, window: Window);

    /// Show `text` in the balloon popup. At most one balloon is visible at a
    /// time; a previous popup is always closed before this is called again.
    fn show_balloon(&mut self, text: &str);

    /// Close the balloon popup if one is visible.
    fn close_balloon(&mut self);

    /// Schedule a one-shot callback in `timeout_ms` milliseconds. On expiry
    /// the shell must call [`crate::Tray::balloon_timeout`] with this id.
    fn start_timer(&mut self, timeout_ms: u32) -> TimerId;

    /// Cancel a previously scheduled timeout. May be called with an id that
    /// already fired; the shell must treat that as a no-op.
    fn cancel_timer(&mut self, timer: TimerId);
}
