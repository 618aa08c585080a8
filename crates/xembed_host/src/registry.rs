use std::collections::BTreeMap;

use x11rb::protocol::xproto::Window;

use crate::shell::{Shell, SocketId};

/// One embedded client, keyed by its X window id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockedClient {
    pub window: Window,
    pub socket: SocketId,
}

/// The set of currently docked clients, ordered by window id.
#[derive(Debug, Default)]
pub struct DockRegistry {
    clients: BTreeMap<Window, DockedClient>,
}

impl DockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a `SYSTEM_TRAY_REQUEST_DOCK`. A request for a window we
    /// already track is a duplicate delivery and is ignored. A client that
    /// vanished between its request and the embed is never registered:
    /// its `DestroyNotify` will not come, so an entry for it could never
    /// be purged again.
    pub fn request_dock(&mut self, window: Window, shell: &mut dyn Shell) {
        if self.clients.contains_key(&window) {
            log::debug!("duplicate dock request for window {:#x}, ignoring", window);
            return;
        }
        let Some(socket) = shell.embed_icon(window) else {
            log::warn!("client window {:#x} vanished before it could be embedded", window);
            return;
        };
        log::info!("docked client window {:#x}", window);
        self.clients.insert(window, DockedClient { window, socket });
    }

    /// `true` while `window` has a live docked entry. Completed balloon
    /// messages from windows that already vanished are dropped based on this.
    pub fn contains(&self, window: Window) -> bool {
        self.clients.contains_key(&window)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Remove the client for `window`, releasing its embedding surface.
    /// Returns whether anything was removed, so the dispatcher knows if the
    /// destroyed window was ours at all.
    pub fn on_window_destroyed(&mut self, window: Window, shell: &mut dyn Shell) -> bool {
        match self.clients.remove(&window) {
            Some(client) => {
                log::info!("undocked client window {:#x}", window);
                shell.remove_icon(client.socket, client.window);
                true
            }
            None => false,
        }
    }

    /// Release every embedding surface. Service shutdown only.
    pub fn clear(&mut self, shell: &mut dyn Shell) {
        while let Some((_, client)) = self.clients.pop_first() {
            shell.remove_icon(client.socket, client.window);
        }
    }
}
