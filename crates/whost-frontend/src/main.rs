use std::path::{Path, PathBuf};

use whost_core::board::{memmap, Dev, REGION_FLASH};
use whost_core::bus::Bus;
use whost_core::dma::regs::*;
use whost_core::{savestate, BoardConfig, ChunkAddressing, WaviousHost};

const USAGE: &str = "Usage: whost [options] <firmware.bin>

Options:
  --msel N                   mode-select pins (3 = debug boot from SRAM)
  --dram-mib N               DRAM size in MiB (default 16)
  --flash FILE               image to place at the start of flash
  --dma SRC,LEN,DST,CHUNK    program and trigger one transfer
                             (SRC is relative to flash, LEN in bytes)
  --incrementing             advance addresses between chunks
  --dump N                   hex-dump N bytes at the DMA destination
  --load-state FILE          restore a save state before the transfer
  --save-state FILE          write a save state after the transfer";

/// One DMA request from the command line.
struct DmaArgs {
    src: u32,
    len: u32,
    dst: u64,
    chunk: u32,
}

fn parse_num(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => s.replace('_', "").parse().ok(),
    }
}

fn parse_dma(s: &str) -> Option<DmaArgs> {
    let parts: Vec<u64> = s.split(',').map(parse_num).collect::<Option<_>>()?;
    let [src, len, dst, chunk] = parts[..] else {
        return None;
    };
    if len == 0 || len > u32::MAX as u64 + 1 || chunk > 0xFF {
        return None;
    }
    Some(DmaArgs {
        src: src as u32,
        len: (len - 1) as u32,
        dst,
        chunk: chunk as u32,
    })
}

/// `--dram-mib` in bytes; `None` on a parse error or overflow.
fn parse_mib(s: &str) -> Option<usize> {
    let mib = usize::try_from(parse_num(s)?).ok()?;
    mib.checked_mul(1024 * 1024)
}

/// Value following `flag`, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn fail(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}

fn hex_dump(base: u64, bytes: &[u8]) {
    for (i, line) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02X}", b)).collect();
        println!("{:010X}: {}", base + i as u64 * 16, hex.join(" "));
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return;
    }

    let takes_value = [
        "--msel",
        "--dram-mib",
        "--flash",
        "--dma",
        "--dump",
        "--load-state",
        "--save-state",
    ];
    let mut firmware = None;
    let mut skip = false;
    for a in args.iter().skip(1) {
        if skip {
            skip = false;
        } else if takes_value.contains(&a.as_str()) {
            skip = true;
        } else if !a.starts_with("--") {
            firmware = Some(PathBuf::from(a));
        }
    }
    let firmware = firmware.unwrap_or_else(|| fail(USAGE));

    let mut config = BoardConfig::default();
    if let Some(v) = flag_value(&args, "--msel") {
        config.msel = parse_num(v).unwrap_or_else(|| fail("--msel: expected a number")) as u32;
    }
    if let Some(v) = flag_value(&args, "--dram-mib") {
        config.dram_size =
            parse_mib(v).unwrap_or_else(|| fail("--dram-mib: expected a size in MiB"));
    }
    if args.iter().any(|a| a == "--incrementing") {
        config.dma.addressing = ChunkAddressing::Incrementing;
    }
    let dma_args = flag_value(&args, "--dma")
        .map(|v| parse_dma(v).unwrap_or_else(|| fail("--dma: expected SRC,LEN,DST,CHUNK")));
    let dump_len = flag_value(&args, "--dump")
        .map(|v| parse_num(v).unwrap_or_else(|| fail("--dump: expected a number")) as usize);

    let mut board = WaviousHost::new(config);
    if let Err(e) = board.load_firmware_file(&firmware) {
        fail(&format!("Failed to load firmware: {}", e));
    }

    if let Some(path) = flag_value(&args, "--flash") {
        let image = std::fs::read(path)
            .unwrap_or_else(|e| fail(&format!("Failed to read {}: {}", path, e)));
        if let Err(e) = board.load_region(REGION_FLASH, 0, &image) {
            fail(&format!("Failed to load flash image: {}", e));
        }
    }

    if let Some(path) = flag_value(&args, "--load-state") {
        if let Err(e) = savestate::load_from_file(&mut board, Path::new(path)) {
            fail(&e);
        }
    }

    if let Some(req) = &dma_args {
        let win = board.dma_window();
        let bus = &mut board.bus;
        bus.write_u32(win + DMA_IRQ_EN, IRQ_EN_DONE);
        bus.write_u32(win + DMA_SRC_ADDR, req.src);
        bus.write_u32(win + DMA_LEN, req.len);
        bus.write_u64(win + DMA_DST_ADDR, req.dst);
        bus.write_u32(win + DMA_CONTROLS, req.chunk);
        bus.write_u32(win + DMA_START, START_TRIGGER);

        println!(
            "DMA: {:#010X} -> {:#010X}, {:#X} bytes, chunk {}",
            memmap(Dev::Flash).base + req.src as u64,
            req.dst,
            req.len as u64 + 1,
            req.chunk
        );
        println!(
            "IRQ_STA={:#04X} line={}",
            bus.read_u32(win + DMA_IRQ_STA),
            if bus.dma_irq_pending() { "asserted" } else { "low" }
        );

        if let Some(n) = dump_len {
            let mut bytes = vec![0u8; n];
            bus.mem.read_bytes(req.dst, &mut bytes);
            hex_dump(req.dst, &bytes);
        }

        if bus.dma_irq_pending() {
            bus.write_u32(win + DMA_IRQ_STA, IRQ_STA_DONE);
            log::info!("acknowledged DMA interrupt");
        }
    }

    if let Some(path) = flag_value(&args, "--save-state") {
        if let Err(e) = savestate::save_to_file(&board, Path::new(path)) {
            fail(&format!("Failed to save state: {}", e));
        }
    }
}
