//! mcsw daemon binary.

fn main() -> anyhow::Result<()> {
    mcswd::cli::run()
}
