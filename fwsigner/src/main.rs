mod signer;

use std::env;
use std::fs;
use std::fs::File;
use std::io::{Read, Write};
use std::process::exit;

use filetime::FileTime;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;

use signer::sign_image;

/// `fwsigner <image.bin> <private_key.pem> <firmware_start_hex> <output.bin>`
///
/// Produces the firmware region blob a device bootloader expects at
/// `firmware_start`: `header | padding | signature | image`.
fn main() {
    let args = env::args().collect::<Vec<_>>();
    if args.len() != 5 {
        eprintln!(
            "usage: {} <image.bin> <private_key.pem> <firmware_start_hex> <output.bin>",
            args.get(0).map(String::as_str).unwrap_or("fwsigner")
        );
        exit(2);
    }

    let image_path = &args[1];
    let key_path = &args[2];
    let firmware_start = u32::from_str_radix(args[3].trim_start_matches("0x"), 16)
        .unwrap_or_else(|e| panic!("invalid firmware_start_hex {:?}: {}", args[3], e));
    let output_path = &args[4];

    let mut image = Vec::new();
    File::open(image_path)
        .unwrap_or_else(|e| panic!("cannot open image {:?}: {}", image_path, e))
        .read_to_end(&mut image)
        .unwrap_or_else(|e| panic!("cannot read image {:?}: {}", image_path, e));

    let key_pem = fs::read_to_string(key_path)
        .unwrap_or_else(|e| panic!("cannot read private key {:?}: {}", key_path, e));
    let signing_key = RsaPrivateKey::from_pkcs1_pem(&key_pem)
        .unwrap_or_else(|e| panic!("not a PKCS#1 RSA private key: {}", e));

    let region = sign_image(&image, &signing_key, firmware_start)
        .unwrap_or_else(|e| panic!("signing failed: {}", e));

    let mut out = File::create(output_path)
        .unwrap_or_else(|e| panic!("cannot create {:?}: {}", output_path, e));
    out.write_all(&region)
        .unwrap_or_else(|e| panic!("cannot write {:?}: {}", output_path, e));

    if let Ok(meta) = fs::metadata(image_path) {
        let mtime = FileTime::from_last_modification_time(&meta);
        let _ = filetime::set_file_mtime(output_path, mtime);
    }

    println!(
        "wrote {} bytes to {:?} (image {} bytes at offset 0x{:x})",
        region.len(),
        output_path,
        image.len(),
        firmware_start as usize + bootcore::constants::FIRMWARE_METADATA_LENGTH
    );
}
