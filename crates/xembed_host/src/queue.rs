use std::collections::VecDeque;

use x11rb::protocol::xproto::Window;

use crate::shell::{Shell, TimerId};

/// A fully assembled balloon message, ready to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balloon {
    pub window: Window,
    pub id: u32,
    pub timeout_ms: u32,
    pub text: String,
}

/// Why the currently displayed balloon is being taken down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    /// The user clicked the popup. The display timer is still pending and
    /// must be cancelled so it can't fire against the next message.
    UserDismissed,
    /// The display timer fired; there is nothing left to cancel.
    TimedOut,
}

/// FIFO of balloon messages. The queue head is the message currently shown
/// in the popup; everything behind it waits its turn.
#[derive(Debug, Default)]
pub struct DisplayQueue {
    messages: VecDeque<Balloon>,
    timer: Option<TimerId>,
}

impl DisplayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The message currently in the popup, if any.
    pub fn displayed(&self) -> Option<&Balloon> {
        self.messages.front()
    }

    /// Append a message. If the queue was empty it becomes the head and is
    /// displayed immediately; otherwise it waits for the head to go away.
    pub fn enqueue(&mut self, balloon: Balloon, shell: &mut dyn Shell) {
        log::debug!("queueing balloon from window {:#x}: {:?}", balloon.window, balloon.text);
        self.messages.push_back(balloon);
        if self.messages.len() == 1 {
            self.display_head(shell);
        }
    }

    fn display_head(&mut self, shell: &mut dyn Shell) {
        let head = self.messages.front().expect("display_head on empty queue");
        shell.show_balloon(&head.text);
        self.timer = if head.timeout_ms != 0 { Some(shell.start_timer(head.timeout_ms)) } else { None };
    }

    fn stop_display(&mut self, shell: &mut dyn Shell, cancel_timer: bool) {
        if let Some(timer) = self.timer.take() {
            if cancel_timer {
                shell.cancel_timer(timer);
            }
        }
        shell.close_balloon();
    }

    /// Take down the displayed message and show the next one, if any.
    pub fn advance(&mut self, reason: AdvanceReason, shell: &mut dyn Shell) {
        if self.messages.is_empty() {
            return;
        }
        self.stop_display(shell, reason == AdvanceReason::UserDismissed);
        self.messages.pop_front();
        if !self.messages.is_empty() {
            self.display_head(shell);
        }
    }

    /// The timer scheduled for the displayed message fired. A stale id
    /// (from a message that was dismissed in the meantime) is ignored.
    pub fn on_timeout(&mut self, timer: TimerId, shell: &mut dyn Shell) {
        if self.timer != Some(timer) {
            log::debug!("stale balloon timer {:?} fired, ignoring", timer);
            return;
        }
        self.advance(AdvanceReason::TimedOut, shell);
    }

    /// Handle `SYSTEM_TRAY_CANCEL_MESSAGE` for an already queued message.
    pub fn cancel(&mut self, window: Window, id: u32, shell: &mut dyn Shell) {
        self.remove_matching(shell, |m| m.window == window && m.id == id);
    }

    /// Drop every message from `window`, displayed or queued.
    pub fn on_window_destroyed(&mut self, window: Window, shell: &mut dyn Shell) {
        self.remove_matching(shell, |m| m.window == window);
    }

    /// Splice out every matching message. If the head is among them its
    /// popup and timer are torn down, and afterwards the new head (if any)
    /// is displayed.
    fn remove_matching(&mut self, shell: &mut dyn Shell, matches: impl Fn(&Balloon) -> bool) {
        let head_removed = self.messages.front().is_some_and(&matches);
        if head_removed {
            self.stop_display(shell, true);
        }
        self.messages.retain(|m| !matches(m));
        if head_removed && !self.messages.is_empty() {
            self.display_head(shell);
        }
    }

    /// Shutdown path: stop the display without showing anything further and
    /// drop the whole queue.
    pub fn clear(&mut self, shell: &mut dyn Shell) {
        if !self.messages.is_empty() {
            self.stop_display(shell, true);
            self.messages.clear();
        }
    }
}
