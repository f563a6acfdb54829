//! Builds a small linked document and writes it as a data blob plus relocation table.
//!
//! ```text
//! cargo run --example nested_blocks -- [OUTPUT_DIR] [BYTE_ORDER]
//! ```
//!
//! `BYTE_ORDER` is `little` (default) or `big`. Set `RUST_LOG=trace` to follow every block
//! as it is opened, closed, and laid out.

use std::{env, path::PathBuf};

use datastream::prelude::*;

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_module("datastream", log::LevelFilter::Debug)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let mut args = env::args().skip(1);
    let out_dir = args.next().map_or_else(env::temp_dir, PathBuf::from);
    let byte_order = match args.next() {
        Some(order) => order.parse::<ByteOrder>().map_err(|_| {
            Error::Malformed {
                message: format!("unknown byte order '{order}'"),
                file: file!(),
                line: line!(),
            }
        })?,
        None => ByteOrder::default(),
    };

    let mut stream = Stream::new(StreamConfig::default().with_byte_order(byte_order))?;

    // Header: magic, entry count, then pointers to the string pool and the entry table
    stream.write_bytes(b"DSTR")?;
    stream.write_uint32(3)?;

    let strings = stream.open_block()?;
    let names: Vec<Pointer> = ["north", "east", "south"]
        .iter()
        .map(|name| -> Result<Pointer> {
            let ptr = stream.new_pointer();
            stream.align(4)?;
            stream.bind(ptr)?;
            stream.write_string(name)?;
            Ok(ptr)
        })
        .collect::<Result<_>>()?;
    stream.close_block()?;

    let entries = stream.open_block()?;
    for (heading, name) in names.iter().enumerate() {
        stream.write_pointer(*name)?;
        stream.write_float64(heading as f64 * 90.0)?;
    }
    stream.close_block()?;

    stream.write_pointer(strings)?;
    stream.write_pointer(entries)?;

    let data_path = out_dir.join("nested_blocks.bin");
    let reloc_path = out_dir.join("nested_blocks.reloc");
    let image = stream.finalize_to_files(&data_path, &reloc_path)?;

    println!("byte order:  {}", image.byte_order());
    println!("data:        {} ({} bytes)", data_path.display(), image.len());
    println!(
        "relocations: {} ({} entries)",
        reloc_path.display(),
        image.relocations().len()
    );
    for (index, region) in image.regions().iter().enumerate() {
        println!(
            "  block {index}: offset {:#06x} size {}",
            region.offset, region.size
        );
    }
    for slot in image.relocations().iter() {
        println!("  slot {slot:#06x} -> {:#06x}", image.read_pointer(slot)?);
    }

    Ok(())
}
