//! Runs with the crate's `malloc` family in place of the C library's.
//!
//! `cargo run --example c_heap --features c-abi`

use std::ptr;

use brkalloc::ffi::{calloc, free, malloc, print_mem_list, realloc};

fn main() {
  unsafe {
    // --------------------------------------------------------------------
    // 1) The C entry points directly.
    // --------------------------------------------------------------------
    let bytes = malloc(8) as *mut u8;
    assert!(!bytes.is_null());
    ptr::copy_nonoverlapping(b"brkalloc".as_ptr(), bytes, 8);

    let bytes = realloc(bytes.cast(), 4096) as *mut u8;
    assert_eq!(std::slice::from_raw_parts(bytes, 8), b"brkalloc");

    let zeroed = calloc(32, 4) as *mut u32;
    assert!(std::slice::from_raw_parts(zeroed, 32).iter().all(|word| *word == 0));

    assert!(malloc(0).is_null());
    assert!(calloc(usize::MAX, 2).is_null());

    println!("[1] after malloc/realloc/calloc:");
    print_mem_list();

    free(zeroed.cast());
    free(bytes.cast());
    free(ptr::null_mut());
  }

  // --------------------------------------------------------------------
  // 2) Rust collections, which go through the same symbols via the
  //    system allocator.
  // --------------------------------------------------------------------
  let mut words: Vec<String> = Vec::new();
  for round in 0..1000 {
    words.push(format!("word-{round}"));
    if round % 3 == 0 {
      words.swap_remove(round % words.len());
    }
  }
  words.sort();
  assert!(words.iter().all(|word| word.starts_with("word-")));

  println!("\n[2] after {} strings of churn:", words.len());
  print_mem_list();
}
