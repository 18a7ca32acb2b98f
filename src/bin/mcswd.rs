//! mcsw daemon - media control server sidecar
//!
//! See `mcswd --help` for the available commands.

fn main() -> anyhow::Result<()> {
    mcswd::cli::run()
}
