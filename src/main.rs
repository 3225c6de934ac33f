use clap::Parser;

use raptor_vm::cli::{run, Mode};

fn main() {
    run(Mode::parse())
}
