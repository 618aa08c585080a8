use std::{os::unix::io::AsRawFd, rc::Rc};

use anyhow::Context;
use x11rb::{connection::Connection, protocol::Event, rust_connection::RustConnection};
use xembed_host::{atoms::TrayAtoms, Dispatch, SelectionOwner, Tray};

use crate::{opts::Opt, shell::X11Shell};

pub fn run(opts: Opt) -> anyhow::Result<()> {
    let (conn, default_screen) = RustConnection::connect(None).context("failed to connect to the X server")?;
    let conn = Rc::new(conn);
    let screen_num = opts.screen.unwrap_or(default_screen);
    anyhow::ensure!(screen_num < conn.setup().roots.len(), "no such screen: {}", screen_num);

    let atoms = TrayAtoms::resolve(&*conn, screen_num)?;
    let mut selection =
        SelectionOwner::acquire(&*conn, screen_num, &atoms).context("could not become the system tray")?;
    let mut shell = X11Shell::new(conn.clone(), screen_num, opts.icon_size)?;
    let mut tray = Tray::new(atoms);
    log::info!("tray running on screen {}", screen_num);

    let fd = conn.stream().as_raw_fd();
    let result = event_loop(&*conn, fd, &mut tray, &mut shell, &mut selection);

    tray.shutdown(&mut shell);
    selection.release(&*conn)?;
    result
}

fn event_loop(
    conn: &RustConnection,
    fd: i32,
    tray: &mut Tray,
    shell: &mut X11Shell,
    selection: &mut SelectionOwner,
) -> anyhow::Result<()> {
    loop {
        // Drain before sleeping: events already sitting in the connection's
        // read buffer (pulled in alongside an earlier reply) never make the
        // fd readable again, so poll(2) would not wake for them.
        while let Some(event) = conn.poll_for_event()? {
            match tray.dispatch(&event, shell) {
                Dispatch::Handled => {}
                Dispatch::OwnershipLost => {
                    selection.on_ownership_lost();
                    log::warn!("tray selection was taken over, shutting down");
                    return Ok(());
                }
                Dispatch::Ignored => match event {
                    Event::Expose(ev) if ev.count == 0 => shell.handle_expose(ev.window),
                    Event::ButtonPress(ev) if shell.is_balloon(ev.event) => tray.balloon_dismissed(shell),
                    Event::Error(err) => log::debug!("absorbed X error: {:?}", err),
                    _ => {}
                },
            }
        }

        conn.flush()?;

        let mut poll_fd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
        unsafe { libc::poll(&mut poll_fd, 1, shell.poll_timeout()) };

        if let Some(timer) = shell.take_expired() {
            tray.balloon_timeout(timer, shell);
        }
    }
}
