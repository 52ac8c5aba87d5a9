use clap::crate_authors;
use structopt::StructOpt;

use std::{io::Write, path::PathBuf};

use lalrgen::{run, Error, Options};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "lalrgen",
    about = "LALR(1) parser generator",
    author = crate_authors!(),
)]
struct CLOptions {
    /// Show only the basis configurations in the report file
    #[structopt(short = "b")]
    basis: bool,
    /// Don't compress the action table
    #[structopt(short = "c")]
    no_compress: bool,
    /// Directory for the output files
    #[structopt(short = "d", parse(from_os_str))]
    directory: Option<PathBuf>,
    /// Print the grammar back out without generating anything
    #[structopt(short = "g")]
    reprint: bool,
    /// Put the token codes in a separate header instead of inline
    #[structopt(short = "m")]
    separate_header: bool,
    /// Don't write the report file
    #[structopt(short = "q")]
    quiet: bool,
    /// Print counts of terminals, nonterminals, rules, states and conflicts
    #[structopt(short = "s")]
    stats: bool,
    /// Template file for the generated parser
    #[structopt(short = "t", parse(from_os_str))]
    template: Option<PathBuf>,
    /// Print the version number and exit
    #[structopt(short = "x")]
    show_version: bool,
    /// The grammar file to process
    #[structopt(parse(from_os_str), required_unless = "show_version")]
    grammar: Option<PathBuf>,
}

fn main() {
    let cl_options = CLOptions::from_args();
    if cl_options.show_version {
        println!("lalrgen version {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }
    let input = match cl_options.grammar {
        Some(path) => path,
        None => {
            writeln!(std::io::stderr(), "No grammar file given.").unwrap();
            std::process::exit(1);
        }
    };
    let options = Options {
        input,
        basis_only: cl_options.basis,
        no_compress: cl_options.no_compress,
        output_dir: cl_options.directory,
        reprint: cl_options.reprint,
        separate_header: cl_options.separate_header,
        quiet: cl_options.quiet,
        stats: cl_options.stats,
        template: cl_options.template,
    };
    match run(&options) {
        Ok(count) => std::process::exit(count as i32),
        Err(error) => {
            writeln!(std::io::stderr(), "{}", error).unwrap();
            let code = match error {
                Error::FileRead(_, _) => 2,
                Error::TemplateOpen(_, _) => 3,
                Error::FileWrite(_, _) => 6,
            };
            std::process::exit(code);
        }
    }
}
