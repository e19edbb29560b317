#![no_main]

mod common;

use libfuzzer_sys::fuzz_target;
use polloc::{MappedPool, Sys};

use crate::common::Action;

fuzz_target!(|actions: Vec<Action>| {
    let mut pool = MappedPool::new(Sys);
    common::run(&mut pool, actions);
});
