use clap::Parser;

/// A minimal XEmbed system tray: docks client icons into a panel strip and
/// shows their balloon messages.
#[derive(Parser, Debug, Clone)]
#[command(name = "traybar", version)]
pub struct Opt {
    /// Write out debug logs.
    #[arg(long = "debug")]
    pub debug: bool,

    /// X screen whose tray selection to claim. Defaults to the display's
    /// default screen.
    #[arg(long)]
    pub screen: Option<usize>,

    /// Edge length of the embedded icons, in pixels.
    #[arg(long, default_value_t = 24)]
    pub icon_size: u16,
}
