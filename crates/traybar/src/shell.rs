use std::{
    rc::Rc,
    time::{Duration, Instant},
};

use x11rb::{
    connection::Connection,
    protocol::xproto::*,
    rust_connection::RustConnection,
    wrapper::ConnectionExt as _,
};
use xembed_host::{Shell, SocketId, TimerId};

x11rb::atom_manager! {
    pub ShellAtoms: ShellAtomsCookie {
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_DOCK,
    }
}

/// Cell metrics of the core `fixed` font used for balloon text.
const FONT_WIDTH: u16 = 6;
const FONT_HEIGHT: u16 = 13;
const FONT_ASCENT: u16 = 11;
const PAD: u16 = 4;

/// ImageText8 carries at most 255 characters per request.
const MAX_TEXT_RUN: usize = 255;

/// Horizontal position of the `index`-th icon socket inside the strip,
/// saturated rather than overflowing for absurd icon counts.
fn slot_x(index: usize, icon_size: u16) -> i16 {
    let x = PAD as u64 + index as u64 * (icon_size as u64 + PAD as u64);
    x.min(i16::MAX as u64) as i16
}

/// Popup dimensions for `lines` of balloon text in the core font, clamped
/// onto the screen. Degenerate client input (thousands of lines) must not
/// overflow the u16 window geometry.
fn balloon_size(lines: &[String], screen_width: u16, screen_height: u16) -> (u16, u16) {
    let columns = lines.iter().map(|l| l.len().min(MAX_TEXT_RUN)).max().unwrap_or(0) as u32;
    let width = (columns * FONT_WIDTH as u32 + 2 * PAD as u32)
        .max(FONT_WIDTH as u32)
        .min(screen_width.max(1) as u32);
    let height = (lines.len() as u32)
        .saturating_mul(FONT_HEIGHT as u32)
        .saturating_add(2 * PAD as u32)
        .max(FONT_HEIGHT as u32)
        .min(screen_height.max(1) as u32);
    (width as u16, height as u16)
}

struct Slot {
    id: SocketId,
    client: Window,
    socket: Window,
}

struct BalloonPopup {
    window: Window,
    lines: Vec<String>,
}

/// X11 implementation of the engine's [`Shell`]: a dock-type strip window
/// that docked icons are reparented into, plus an override-redirect popup
/// for balloon text.
///
/// X calls in here can race against clients destroying their windows, so
/// their failures are logged and absorbed rather than propagated.
pub struct X11Shell {
    conn: Rc<RustConnection>,
    root: Window,
    screen_width: u16,
    screen_height: u16,
    white_pixel: u32,
    black_pixel: u32,
    strip: Window,
    gc: Gcontext,
    icon_size: u16,
    slots: Vec<Slot>,
    next_socket: u64,
    balloon: Option<BalloonPopup>,
    next_timer: u64,
    deadline: Option<(TimerId, Instant)>,
}

impl X11Shell {
    pub fn new(conn: Rc<RustConnection>, screen_num: usize, icon_size: u16) -> anyhow::Result<Self> {
        let screen = conn.setup().roots[screen_num].clone();
        let atoms = ShellAtoms::new(&*conn)?.reply()?;

        let strip = conn.generate_id()?;
        let strip_height = (icon_size as u32 + 2 * PAD as u32).min(u16::MAX as u32) as u16;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            strip,
            screen.root,
            0,
            0,
            1,
            strip_height,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().background_pixel(screen.white_pixel).event_mask(EventMask::EXPOSURE),
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            strip,
            atoms._NET_WM_WINDOW_TYPE,
            AtomEnum::ATOM,
            &[atoms._NET_WM_WINDOW_TYPE_DOCK],
        )?;
        conn.map_window(strip)?;

        let font = conn.generate_id()?;
        conn.open_font(font, b"fixed")?;
        let gc = conn.generate_id()?;
        conn.create_gc(
            gc,
            strip,
            &CreateGCAux::new().foreground(screen.black_pixel).background(screen.white_pixel).font(font),
        )?;
        conn.close_font(font)?;
        conn.flush()?;

        Ok(X11Shell {
            conn,
            root: screen.root,
            screen_width: screen.width_in_pixels,
            screen_height: screen.height_in_pixels,
            white_pixel: screen.white_pixel,
            black_pixel: screen.black_pixel,
            strip,
            gc,
            icon_size,
            slots: Vec::new(),
            next_socket: 0,
            balloon: None,
            next_timer: 0,
            deadline: None,
        })
    }

    /// Reposition the sockets into one row and fit the strip around them.
    fn relayout(&self) {
        for (i, slot) in self.slots.iter().enumerate() {
            let _ = self.conn.configure_window(slot.socket, &ConfigureWindowAux::new().x(slot_x(i, self.icon_size) as i32));
        }
        let width =
            (PAD as u32 + self.slots.len() as u32 * (self.icon_size as u32 + PAD as u32)).clamp(1, u16::MAX as u32);
        let _ = self.conn.configure_window(self.strip, &ConfigureWindowAux::new().width(width));
        let _ = self.conn.flush();
    }

    fn try_embed(&mut self, client: Window, socket: Window) -> Result<(), x11rb::errors::ReplyError> {
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            socket,
            self.strip,
            slot_x(self.slots.len(), self.icon_size),
            PAD as i16,
            self.icon_size,
            self.icon_size,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::SUBSTRUCTURE_NOTIFY),
        )?;
        // Also select StructureNotify on the client itself: the socket's
        // SubstructureNotify misses a client that dies before the reparent
        // lands. These two requests are checked synchronously: a BadWindow
        // here means the client vanished right after its dock request, and
        // once the event-mask request has failed no DestroyNotify would
        // ever purge the entry.
        self.conn
            .change_window_attributes(client, &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY))?
            .check()?;
        self.conn.reparent_window(client, socket, 0, 0)?.check()?;
        self.conn.configure_window(
            client,
            &ConfigureWindowAux::new().width(self.icon_size as u32).height(self.icon_size as u32),
        )?;
        self.conn.map_window(socket)?;
        self.conn.map_window(client)?;
        Ok(())
    }

    /// `true` when `window` is the balloon popup, so the event loop knows a
    /// button press in it dismisses the balloon.
    pub fn is_balloon(&self, window: Window) -> bool {
        self.balloon.as_ref().is_some_and(|b| b.window == window)
    }

    pub fn handle_expose(&self, window: Window) {
        let Some(balloon) = self.balloon.as_ref() else { return };
        if balloon.window != window {
            return;
        }
        for (i, line) in balloon.lines.iter().enumerate() {
            let y = (PAD + FONT_ASCENT + i as u16 * FONT_HEIGHT) as i16;
            let run = &line.as_bytes()[..line.len().min(MAX_TEXT_RUN)];
            let _ = self.conn.image_text8(balloon.window, self.gc, PAD as i16, y, run);
        }
        let _ = self.conn.flush();
    }

    /// Milliseconds until the balloon deadline, for `poll(2)`. `-1` blocks
    /// indefinitely.
    pub fn poll_timeout(&self) -> i32 {
        match self.deadline {
            None => -1,
            Some((_, at)) => at.saturating_duration_since(Instant::now()).as_millis().min(i32::MAX as u128) as i32,
        }
    }

    /// Take the deadline if it has passed.
    pub fn take_expired(&mut self) -> Option<TimerId> {
        match self.deadline {
            Some((id, at)) if Instant::now() >= at => {
                self.deadline = None;
                Some(id)
            }
            _ => None,
        }
    }
}

impl Shell for X11Shell {
    fn embed_icon(&mut self, window: Window) -> Option<SocketId> {
        let socket = match self.conn.generate_id() {
            Ok(socket) => socket,
            Err(err) => {
                log::warn!("could not allocate a socket window id: {}", err);
                return None;
            }
        };
        if let Err(err) = self.try_embed(window, socket) {
            log::warn!("embedding window {:#x} failed: {}", window, err);
            let _ = self.conn.destroy_window(socket);
            let _ = self.conn.flush();
            return None;
        }

        let id = SocketId(self.next_socket);
        self.next_socket += 1;
        self.slots.push(Slot { id, client: window, socket });
        self.relayout();
        Some(id)
    }

    fn remove_icon(&mut self, socket: SocketId, window: Window) {
        let Some(pos) = self.slots.iter().position(|s| s.id == socket) else { return };
        let slot = self.slots.remove(pos);
        // The client window is usually gone already; if it still exists,
        // hand it back to the root before its socket is destroyed.
        let _ = self.conn.reparent_window(slot.client, self.root, 0, 0);
        let _ = self.conn.unmap_window(slot.client);
        let _ = self.conn.destroy_window(slot.socket);
        self.relayout();
        log::debug!("released socket {:?} of window {:#x}", socket, window);
    }

    fn show_balloon(&mut self, text: &str) {
        let lines: Vec<String> = if text.is_empty() {
            vec![String::new()]
        } else {
            text.lines().map(str::to_string).collect()
        };
        let (width, height) = balloon_size(&lines, self.screen_width, self.screen_height);

        let window = match self.conn.generate_id() {
            Ok(window) => window,
            Err(err) => {
                log::warn!("could not allocate a balloon window id: {}", err);
                return;
            }
        };
        let create = self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            self.root,
            PAD as i16,
            (self.icon_size as i32 + 3 * PAD as i32).min(i16::MAX as i32) as i16,
            width,
            height,
            1,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .override_redirect(1)
                .background_pixel(self.white_pixel)
                .border_pixel(self.black_pixel)
                .event_mask(EventMask::EXPOSURE | EventMask::BUTTON_PRESS),
        );
        if let Err(err) = create {
            log::warn!("could not create the balloon window: {}", err);
            return;
        }
        let _ = self.conn.map_window(window);
        let _ = self.conn.flush();
        self.balloon = Some(BalloonPopup { window, lines });
    }

    fn close_balloon(&mut self) {
        if let Some(balloon) = self.balloon.take() {
            let _ = self.conn.destroy_window(balloon.window);
            let _ = self.conn.flush();
        }
    }

    fn start_timer(&mut self, timeout_ms: u32) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.deadline = Some((id, Instant::now() + Duration::from_millis(timeout_ms as u64)));
        id
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        if self.deadline.map(|(id, _)| id) == Some(timer) {
            self.deadline = None;
        }
    }
}
