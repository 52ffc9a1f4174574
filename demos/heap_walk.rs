use std::{io::Read, ptr};

use brkalloc::{
  BRK_ALLOCATOR, ProgramBreak,
  logger::{FdWriter, StderrLogger},
};
use log::LevelFilter;

/// Waits until the user presses ENTER, when run with `--pause`.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed(pause: bool) {
  if !pause {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break and the allocator's block list.
fn print_state(label: &str) {
  let brk = BRK_ALLOCATOR.inspect(|heap| heap.brk().current());
  println!(
    "[{}] PID = {}, program break = {:?}, blocks = {}",
    label,
    std::process::id(),
    brk,
    BRK_ALLOCATOR.len(),
  );
  let _ = BRK_ALLOCATOR.dump_state(&mut FdWriter::stderr());
}

fn main() {
  let pause = std::env::args().any(|arg| arg == "--pause");
  let _ = StderrLogger::init(LevelFilter::Trace);

  print_state("start");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 1) A u32: the payload is still 16-byte aligned and padded to 16.
  // --------------------------------------------------------------------
  let first = BRK_ALLOCATOR.allocate(4) as *mut u32;
  unsafe { first.write(0xDEADBEEF) };
  println!("\n[1] u32 at {:?} = 0x{:X}", first, unsafe { first.read() });
  print_state("1");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 2) 12 zeroed bytes, then a byte pattern.
  // --------------------------------------------------------------------
  let second = BRK_ALLOCATOR.zero_allocate(12, 1);
  unsafe { ptr::write_bytes(second, 0xAB, 12) };
  println!("\n[2] [u8; 12] at {:?}", second);
  print_state("2");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 3) Release the first block. It is not the tail, so it stays in the
  //    list, flagged free.
  // --------------------------------------------------------------------
  unsafe { BRK_ALLOCATOR.release(first as *mut u8) };
  println!("\n[3] Released first block");
  print_state("3");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 4) Two bytes fit in the freed block: first fit hands it back whole.
  // --------------------------------------------------------------------
  let third = BRK_ALLOCATOR.allocate(2);
  println!(
    "\n[4] [u8; 2] at {:?}, reused first block? {}",
    third,
    third == first as *mut u8
  );
  print_state("4");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 5) Grow the 12-byte block to 64 KiB. It moves to a fresh block at the
  //    top of the heap and the old one is flagged free.
  // --------------------------------------------------------------------
  let big = unsafe { BRK_ALLOCATOR.resize(second, 64 * 1024) };
  println!(
    "\n[5] Resized to 64 KiB at {:?}, first byte still 0x{:X}",
    big,
    unsafe { big.read() }
  );
  print_state("5");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 6) Release the big block. It is the tail, so the break moves down.
  // --------------------------------------------------------------------
  unsafe { BRK_ALLOCATOR.release(big) };
  println!("\n[6] Released the tail block");
  print_state("6");

  println!("\n[7] End of example. Process will exit and the OS will reclaim all memory.");
}
