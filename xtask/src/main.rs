#![deny(unused_must_use)]

use std::{env, path::PathBuf};

use bootcore::constants::FIRMWARE_START_ADDRESS;
use xshell::cmd;

#[rustfmt::skip]
fn main() -> Result<(), anyhow::Error> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let args = args.iter().map(|s| &**s).collect::<Vec<_>>();

    match &args[..] {
        ["test"]                      => test(),
        ["build"]                     => build_bootloader(),
        ["sign", image, key, out]     => sign_image(image, key, out),
        #[cfg(feature = "mcu")]
        ["flash"]                     => flash_bootloader(),
        _ => {
            println!("USAGE: cargo xtask test");
            println!("OR");
            println!("USAGE: cargo xtask build");
            println!("OR");
            println!("USAGE: cargo xtask sign <image.bin> <private_key.pem> <out.bin>");
            println!("OR (mcu feature only)");
            println!("USAGE: cargo xtask flash");
            Ok(())
        }
    }
}

fn test() -> Result<(), anyhow::Error> {
    let _p = xshell::pushd(root_dir())?;
    cmd!("cargo test --workspace").run()?;
    Ok(())
}

fn build_bootloader() -> Result<(), anyhow::Error> {
    let _p = xshell::pushd(root_dir().join("boards/nrf52840-bootloader"))?;
    cmd!("cargo build --release").run()?;
    Ok(())
}

fn sign_image(image: &&str, key: &&str, out: &&str) -> Result<(), anyhow::Error> {
    let _p = xshell::pushd(root_dir())?;
    let fw_start = format!("0x{:x}", FIRMWARE_START_ADDRESS);
    cmd!("cargo run --release --bin fwsigner -- {image} {key} {fw_start} {out}").run()?;
    Ok(())
}

#[cfg(feature = "mcu")]
fn flash_bootloader() -> Result<(), anyhow::Error> {
    let _p = xshell::pushd(root_dir().join("boards/nrf52840-bootloader"))?;
    cmd!("cargo flash --chip nRF52840_xxAA --release").run()?;
    Ok(())
}

fn root_dir() -> PathBuf {
    let mut xtask_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    xtask_dir.pop();
    xtask_dir
}
