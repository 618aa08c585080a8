use x11rb::{connection::Connection, protocol::xproto::*};

use crate::error::Result;

x11rb::atom_manager! {
    pub AtomCollection: AtomCollectionCookie {
        MANAGER,
        _NET_SYSTEM_TRAY_OPCODE,
        _NET_SYSTEM_TRAY_MESSAGE_DATA,
        _NET_SYSTEM_TRAY_ORIENTATION,
        CARDINAL,
    }
}

/// Resolved atoms needed to route and speak the tray protocol. Kept as plain
/// data so event routing doesn't need a live connection (see [`crate::Tray`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrayAtoms {
    /// `_NET_SYSTEM_TRAY_S{n}`, where `n` is the screen number.
    pub selection: Atom,
    pub manager: Atom,
    pub opcode: Atom,
    pub message_data: Atom,
    pub orientation: Atom,
    pub cardinal: Atom,
}

impl TrayAtoms {
    /// Intern all protocol atoms in one round trip batch. The selection atom
    /// embeds the screen number, so it can't be part of the static collection.
    pub fn resolve<C: Connection>(conn: &C, screen_num: usize) -> Result<Self> {
        let collection_cookie = AtomCollection::new(conn)?;
        let selection_name = format!("_NET_SYSTEM_TRAY_S{}", screen_num);
        let selection_cookie = conn.intern_atom(false, selection_name.as_bytes())?;
        let atoms = collection_cookie.reply()?;
        let selection = selection_cookie.reply()?.atom;
        Ok(TrayAtoms {
            selection,
            manager: atoms.MANAGER,
            opcode: atoms._NET_SYSTEM_TRAY_OPCODE,
            message_data: atoms._NET_SYSTEM_TRAY_MESSAGE_DATA,
            orientation: atoms._NET_SYSTEM_TRAY_ORIENTATION,
            cardinal: atoms.CARDINAL,
        })
    }
}
