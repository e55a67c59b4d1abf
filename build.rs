use anyhow::Result;
use vergen::{vergen, Config};

fn main() -> Result<()> {
    // Generate the default 'cargo:' instruction output. Git metadata is not
    // available in release tarballs, so only build and rustc info is emitted.
    let mut config = Config::default();
    *config.git_mut().enabled_mut() = false;
    vergen(config)
}
