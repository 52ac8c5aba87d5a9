use std::{
    fs,
    io::{stderr, stdout, Write},
    path::PathBuf,
};

pub mod action;
pub mod emit;
pub mod error;
pub mod grammar;
pub mod pool;
pub mod report;
pub mod rule;
pub mod scanner;
pub mod state;
pub mod symbol;
pub mod table;

pub use error::Error;

/// Everything the command line can ask for.
#[derive(Debug, Default)]
pub struct Options {
    /// The grammar file.
    pub input: PathBuf,
    /// Report only basis configurations, not the full closures.
    pub basis_only: bool,
    /// Leave the action table uncompressed.
    pub no_compress: bool,
    /// Where the output files go; defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
    /// Print the grammar back out and stop.
    pub reprint: bool,
    /// Put the token codes in the header only, not inline.
    pub separate_header: bool,
    /// Skip the report file.
    pub quiet: bool,
    /// Print summary counts on stdout.
    pub stats: bool,
    /// Explicit template file.
    pub template: Option<PathBuf>,
}

impl Options {
    pub fn new<P: Into<PathBuf>>(input: P) -> Self {
        let mut options = Options::default();
        options.input = input.into();
        options
    }
}

fn output_path(options: &Options, extension: &str) -> PathBuf {
    let mut path = PathBuf::new();
    match &options.output_dir {
        Some(dir) => path.push(dir),
        None => {
            if let Some(parent) = options.input.parent() {
                path.push(parent);
            }
        }
    }
    path.push(options.input.file_stem().expect("input has a name"));
    path.set_extension(extension);
    path
}

fn basename(options: &Options) -> String {
    options
        .input
        .file_stem()
        .expect("input has a name")
        .to_string_lossy()
        .to_string()
}

/// Run the whole pipeline for one grammar file.  Returns the count the
/// process should exit with: grammar errors plus unresolved conflicts.
/// Host failures (unreadable input, unwritable output) come back as `Err`.
pub fn run(options: &Options) -> Result<u32, Error> {
    let text = fs::read_to_string(&options.input)
        .map_err(|cause| Error::FileRead(options.input.clone(), cause))?;
    let filename = options.input.to_string_lossy().to_string();
    let mut grammar = grammar::Grammar::new(&filename);
    scanner::parse_grammar(&text, &mut grammar);

    if options.reprint {
        grammar
            .reprint(&mut stdout())
            .map_err(|cause| Error::FileWrite(PathBuf::from("(stdout)"), cause))?;
        return Ok(grammar.error_count());
    }
    if grammar.error_count() > 0 {
        return Ok(grammar.error_count());
    }

    grammar.prepare();
    if grammar.rules.is_empty() {
        return Ok(grammar.error_count());
    }

    let states = state::StateBuilder::build(&grammar);
    let conflicts = action::find_actions(&grammar, &states);
    if !options.no_compress {
        table::compress_tables(&grammar, &states);
    }
    let packed = table::pack_tables(&grammar, &states);

    if !options.quiet {
        let report_path = output_path(options, "out");
        let mut file = fs::File::create(&report_path)
            .map_err(|cause| Error::FileWrite(report_path.clone(), cause))?;
        report::write_report(&states, options.basis_only, &mut file)
            .map_err(|cause| Error::FileWrite(report_path.clone(), cause))?;
    }

    let template = emit::resolve_template(options.template.as_deref(), &options.input)?;
    let parser_path = output_path(options, "c");
    {
        let mut file = fs::File::create(&parser_path)
            .map_err(|cause| Error::FileWrite(parser_path.clone(), cause))?;
        emit::write_parser(
            &grammar,
            &states,
            &packed,
            options.separate_header,
            &basename(options),
            &template,
            &mut file,
        )
        .map_err(|cause| Error::FileWrite(parser_path.clone(), cause))?;
    }

    let header_path = output_path(options, "h");
    emit::write_header(&grammar, &header_path)
        .map_err(|cause| Error::FileWrite(header_path.clone(), cause))?;

    if options.stats {
        report::write_stats(&grammar, &states, packed.len(), conflicts, &mut stdout())
            .map_err(|cause| Error::FileWrite(PathBuf::from("(stdout)"), cause))?;
    }
    if conflicts > 0 {
        writeln!(stderr(), "{} parsing conflicts.", conflicts).expect("stderr");
    }
    Ok(grammar.error_count() + conflicts)
}
