#![no_main]
use libfuzzer_sys::fuzz_target;

use swsb_util::{parser, test_framework as ir};

fuzz_target!(|program: ir::Program| {
  program.print("generated program");

  let mut printed = String::new();
  program.render("program", &mut printed).expect("error when printing the first time");

  let parsed = match parser::parse_content("prog", &printed) {
    Ok(parsed) => parsed,
    Err(err) => {
      println!("parse error: {:?}", err);
      return;
    }
  };

  let mut reprinted = String::new();
  parsed.render("program", &mut reprinted).unwrap();

  let reparsed = parser::parse_content("prog", &reprinted).expect("shouldn't error on the second parse!");
  let mut rereprinted = String::new();
  reparsed.render("program", &mut rereprinted).unwrap();

  assert_eq!(reprinted, rereprinted);
});
