use x11rb::{
    connection::Connection,
    protocol::{xproto::*, Event},
    wrapper::ConnectionExt as _,
    CURRENT_TIME, NONE,
};

use crate::{
    atoms::TrayAtoms,
    error::{Error, Result},
};

/// Always advertised as horizontal, matching how panel trays lay icons out
/// even on vertical panels.
const ORIENTATION_HORIZONTAL: u32 = 0;

/// Holder of the `_NET_SYSTEM_TRAY_S{n}` manager selection.
///
/// At most one process per screen may own this selection; owning it is what
/// makes us "the" system tray that clients send dock requests to. The
/// selection is held on a never-mapped helper window, created here and
/// destroyed on [`release`][SelectionOwner::release].
#[derive(Debug)]
pub struct SelectionOwner {
    owner_window: Window,
    selection: Atom,
    held: bool,
}

impl SelectionOwner {
    /// Claim the tray selection for `screen_num`.
    ///
    /// Fails with [`Error::SelectionAlreadyOwned`] when another tray already
    /// owns it, before creating any window or sending anything. On success
    /// the ICCCM `MANAGER` announcement goes out to the root window and the
    /// orientation property is written on the helper window.
    pub fn acquire<C: Connection>(conn: &C, screen_num: usize, atoms: &TrayAtoms) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num];

        let current = conn.get_selection_owner(atoms.selection)?.reply()?.owner;
        if current != NONE {
            return Err(Error::SelectionAlreadyOwned);
        }

        // The selection needs a window to live on. Never mapped, so never
        // visible; PropertyChange is selected for the timestamp round trip.
        let owner_window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            owner_window,
            screen.root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;

        // ICCCM forbids claiming a selection with CURRENT_TIME, so fetch a
        // real server timestamp by provoking a PropertyNotify on our window.
        let timestamp = server_timestamp(conn, owner_window)?;

        conn.set_selection_owner(owner_window, atoms.selection, timestamp)?;
        if conn.get_selection_owner(atoms.selection)?.reply()?.owner != owner_window {
            // Lost the race against another tray starting at the same moment.
            conn.destroy_window(owner_window)?;
            conn.flush()?;
            return Err(Error::SelectionAlreadyOwned);
        }

        conn.change_property32(
            PropMode::REPLACE,
            owner_window,
            atoms.orientation,
            atoms.cardinal,
            &[ORIENTATION_HORIZONTAL],
        )?;

        // Tell waiting clients that a manager exists now (ICCCM MANAGER
        // broadcast; clients select StructureNotify on the root for this).
        let announcement = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window: screen.root,
            type_: atoms.manager,
            data: [timestamp, atoms.selection, owner_window, 0, 0].into(),
        };
        conn.send_event(false, screen.root, EventMask::STRUCTURE_NOTIFY, announcement)?;
        conn.flush()?;

        log::info!("acquired tray selection for screen {} on window {:#x}", screen_num, owner_window);
        Ok(SelectionOwner { owner_window, selection: atoms.selection, held: true })
    }

    /// The helper window holding the selection. Clients address their dock
    /// requests and balloon messages to this window.
    pub fn owner_window(&self) -> Window {
        self.owner_window
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// The server revoked our ownership (another manager forced a takeover).
    /// After this, [`release`][SelectionOwner::release] only cleans up the
    /// helper window.
    pub fn on_ownership_lost(&mut self) {
        log::warn!("lost the tray selection to another manager");
        self.held = false;
    }

    /// Give the selection up and destroy the helper window. Idempotent.
    pub fn release<C: Connection>(&mut self, conn: &C) -> Result<()> {
        if self.owner_window == NONE {
            return Ok(());
        }
        if self.held {
            conn.set_selection_owner(NONE, self.selection, CURRENT_TIME)?;
            self.held = false;
        }
        conn.destroy_window(self.owner_window)?;
        conn.flush()?;
        self.owner_window = NONE;
        Ok(())
    }
}

/// Obtain a current server timestamp: append zero bytes to a property on
/// `window` and read the time off the resulting PropertyNotify. Only safe to
/// call while no other events are expected on the connection.
fn server_timestamp<C: Connection>(conn: &C, window: Window) -> Result<Timestamp> {
    conn.change_property8(PropMode::APPEND, window, AtomEnum::WM_NAME, AtomEnum::STRING, &[])?;
    conn.flush()?;
    loop {
        match conn.wait_for_event()? {
            Event::PropertyNotify(ev) if ev.window == window => return Ok(ev.time),
            _ => {}
        }
    }
}
