use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;
use crate::grammar::Grammar;
use crate::rule::{CodeBlock, Rule};
use crate::state::State;
use crate::table::PackedTable;

/// Driver template compiled into the binary, used when no template file is
/// found next to the grammar and none is named on the command line.
pub const BUILTIN_TEMPLATE: &str = include_str!("../templates/lempar.c");

lazy_static! {
    static ref PARSE_PREFIX_RE: Regex = Regex::new(r"\bParse").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

/// Copies template text up to each `%%` cut line, renaming the `Parse`
/// prefix of every identifier to the grammar's parser name on the way
/// through.
pub struct TemplateDriver<'t> {
    lines: Vec<&'t str>,
    pos: usize,
    name: String,
}

impl<'t> TemplateDriver<'t> {
    pub fn new(text: &'t str, name: &str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
            name: name.to_string(),
        }
    }

    fn substitute(&self, line: &str) -> String {
        PARSE_PREFIX_RE
            .replace_all(line, self.name.as_str())
            .to_string()
    }

    /// Copy lines until the next `%%` marker, which is consumed.
    pub fn transfer<W: Write>(&mut self, wtr: &mut W) -> io::Result<()> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            if line.starts_with("%%") {
                return Ok(());
            }
            writeln!(wtr, "{}", self.substitute(line))?;
        }
        Ok(())
    }

    /// Copy everything after the final marker.
    pub fn finish<W: Write>(&mut self, wtr: &mut W) -> io::Result<()> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            writeln!(wtr, "{}", self.substitute(line))?;
        }
        Ok(())
    }
}

/// Locate the template text: an explicit `-t` path, else `lempar.c` beside
/// the grammar file, else the built-in copy.
pub fn resolve_template(explicit: Option<&Path>, input: &Path) -> Result<String, Error> {
    if let Some(path) = explicit {
        return fs::read_to_string(path)
            .map_err(|cause| Error::TemplateOpen(path.to_path_buf(), cause));
    }
    let sibling: PathBuf = input.with_file_name("lempar.c");
    if sibling.exists() {
        return fs::read_to_string(&sibling).map_err(|cause| Error::TemplateOpen(sibling, cause));
    }
    Ok(BUILTIN_TEMPLATE.to_string())
}

fn hash_type(text: &str) -> usize {
    let mut hash = 0usize;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(53).wrapping_add(byte as usize);
    }
    hash
}

/// Give every distinct `%type` annotation a slot in the value union, by
/// hashing the type text into a scratch table with linear probing.  Slot 0
/// is shared by everything without a typed value; the error symbol gets a
/// dedicated integer slot above the table.  Returns the occupied slots in
/// ascending order.
pub fn assign_type_slots(grammar: &Grammar) -> Vec<(usize, String)> {
    let array_size = grammar.n_symbols() * 2;
    let mut types: Vec<Option<String>> = vec![None; array_size];
    for symbol in grammar.symbols.symbols() {
        if symbol.is_error() {
            symbol.set_dtnum(array_size + 1);
            continue;
        }
        if symbol.is_terminal() || symbol.is_default_mark() {
            symbol.set_dtnum(0);
            continue;
        }
        let text = match symbol.data_type() {
            Some(block) => block.text.trim().to_string(),
            None => {
                symbol.set_dtnum(0);
                continue;
            }
        };
        let mut slot = hash_type(&text) % array_size;
        loop {
            match &types[slot] {
                Some(existing) if *existing == text => break,
                Some(_) => slot = (slot + 1) % array_size,
                None => {
                    types[slot] = Some(text.clone());
                    break;
                }
            }
        }
        symbol.set_dtnum(slot + 1);
    }
    types
        .into_iter()
        .enumerate()
        .filter_map(|(index, text)| text.map(|text| (index + 1, text)))
        .collect()
}

fn token_defines(grammar: &Grammar) -> String {
    let prefix = grammar.token_prefix.as_deref().unwrap_or("");
    let mut text = String::new();
    for terminal in grammar.symbols.terminals().iter().skip(1) {
        text += &format!("#define {}{} {:>2}\n", prefix, terminal.name(), terminal.ident());
    }
    text
}

/// Write the token `#define` header, leaving the file untouched (mtime
/// included) when its content would not change.  Returns whether the file
/// was rewritten.
pub fn write_header(grammar: &Grammar, path: &Path) -> io::Result<bool> {
    let content = token_defines(grammar);
    match fs::read_to_string(path) {
        Ok(existing) if existing == content => Ok(false),
        _ => {
            fs::write(path, &content)?;
            Ok(true)
        }
    }
}

fn write_arg_defines<W: Write>(grammar: &Grammar, wtr: &mut W) -> io::Result<()> {
    let prefix = grammar.parser_name();
    match &grammar.extra_argument {
        Some(block) => {
            let decl = block.text.trim();
            let name = IDENT_RE
                .find_iter(decl)
                .last()
                .map(|found| found.as_str().to_string())
                .unwrap_or_default();
            writeln!(wtr, "#define {}ARG_SDECL {};", prefix, decl)?;
            writeln!(wtr, "#define {}ARG_PDECL ,{}", prefix, decl)?;
            writeln!(wtr, "#define {}ARG_FETCH {} = yypParser->{}", prefix, decl, name)?;
            writeln!(wtr, "#define {}ARG_STORE yypParser->{} = {}", prefix, name, name)?;
        }
        None => {
            writeln!(wtr, "#define {}ARG_SDECL", prefix)?;
            writeln!(wtr, "#define {}ARG_PDECL", prefix)?;
            writeln!(wtr, "#define {}ARG_FETCH", prefix)?;
            writeln!(wtr, "#define {}ARG_STORE", prefix)?;
        }
    }
    Ok(())
}

fn expand_destructor(code: &CodeBlock, dtnum: usize) -> String {
    code.text.replace("$$", &format!("(yypminor->yy{})", dtnum))
}

fn write_destructors<W: Write>(grammar: &Grammar, wtr: &mut W) -> io::Result<()> {
    if let Some(code) = &grammar.token_destructor {
        let terminals = &grammar.symbols.terminals()[1..];
        if !terminals.is_empty() {
            for terminal in terminals {
                writeln!(wtr, "    case {}: /* {} */", terminal.ident(), terminal.name())?;
            }
            writeln!(wtr, "{}", expand_destructor(code, 0))?;
            writeln!(wtr, "      break;")?;
        }
    }
    for symbol in grammar.symbols.non_terminals() {
        if let Some(code) = symbol.destructor() {
            writeln!(wtr, "    case {}: /* {} */", symbol.ident(), symbol.name())?;
            writeln!(wtr, "{}", expand_destructor(&code, symbol.dtnum()))?;
            writeln!(wtr, "      break;")?;
        }
    }
    Ok(())
}

/// Rewrite one rule's action for the generated `yy_reduce`.  The left-hand
/// alias becomes the reducer's output slot, each right-hand alias becomes
/// the stack cell it names, and right-hand symbols whose value the action
/// never receives get their destructor called instead.  Aliases that are
/// declared but never referenced are reported as errors.
pub fn translate_rule_code(grammar: &Grammar, rule: &Rule) -> String {
    let n = rule.len();
    let action = rule.action();
    let mut used_lhs = false;
    let mut used_rhs = vec![false; n];
    let mut body = String::new();
    if let Some(code) = &action {
        body = IDENT_RE
            .replace_all(&code.text, |caps: &regex::Captures| {
                let word = caps.get(0).expect("match").as_str();
                if rule.lhs_alias() == Some(word) {
                    used_lhs = true;
                    return format!("yygotominor.yy{}", rule.lhs().dtnum());
                }
                for index in 0..n {
                    if rule.rhs_alias(index) == Some(word) {
                        used_rhs[index] = true;
                        return format!(
                            "yymsp[{}].minor.yy{}",
                            index as i64 - (n as i64 - 1),
                            rule.rhs_symbol(index).expect("in range").dtnum()
                        );
                    }
                }
                word.to_string()
            })
            .to_string();
    }

    let line = action.as_ref().map_or_else(|| rule.line(), |code| code.line);
    if let Some(alias) = rule.lhs_alias() {
        if !used_lhs {
            grammar.error(
                line,
                &format!(
                    "Label \"{}\" for \"{}({})\" is never used",
                    alias,
                    rule.lhs().name(),
                    alias
                ),
            );
        }
    }
    for index in 0..n {
        if let Some(alias) = rule.rhs_alias(index) {
            if !used_rhs[index] {
                grammar.error(
                    line,
                    &format!(
                        "Label \"{}\" for \"{}({})\" is never used",
                        alias,
                        rule.rhs_symbol(index).expect("in range").name(),
                        alias
                    ),
                );
            }
        }
    }

    for index in 0..n {
        if rule.rhs_alias(index).is_some() {
            continue;
        }
        let symbol = rule.rhs_symbol(index).expect("in range");
        let destructor = symbol.destructor().or_else(|| {
            if symbol.is_terminal() {
                grammar.token_destructor.clone()
            } else {
                None
            }
        });
        if destructor.is_some() {
            body += &format!(
                "\n  yy_destructor({},&yymsp[{}].minor);",
                symbol.ident(),
                index as i64 - (n as i64 - 1)
            );
        }
    }
    body.trim_matches('\n').to_string()
}

/// Interleave the generated fragments with the template.  The fragment
/// order is the template's cut-point contract; changing one without the
/// other breaks the generated file.
pub fn write_parser<W: Write>(
    grammar: &Grammar,
    states: &[State],
    table: &PackedTable,
    separate_header: bool,
    basename: &str,
    template: &str,
    wtr: &mut W,
) -> io::Result<()> {
    let mut driver = TemplateDriver::new(template, grammar.parser_name());
    let type_slots = assign_type_slots(grammar);
    let n_states = states.len();
    let n_rules = grammar.n_rules();
    let error_symbol = grammar.symbols.error_symbol();
    let error_used = error_symbol.is_used_on_rhs();

    // Include block.
    driver.transfer(wtr)?;
    if let Some(include) = &grammar.include {
        writeln!(wtr, "{}", include.text)?;
    }
    if separate_header {
        writeln!(wtr, "#include \"{}.h\"", basename)?;
    }

    // Token codes.
    driver.transfer(wtr)?;
    if !separate_header {
        write!(wtr, "{}", token_defines(grammar))?;
    }

    // Sizes, the value union and the context defines.
    driver.transfer(wtr)?;
    writeln!(
        wtr,
        "#define YYCODETYPE {}",
        if grammar.n_symbols() <= 250 { "unsigned char" } else { "int" }
    )?;
    writeln!(wtr, "#define YYNOCODE {}", grammar.n_symbols())?;
    writeln!(
        wtr,
        "#define YYACTIONTYPE {}",
        if n_states + n_rules <= 250 { "unsigned char" } else { "int" }
    )?;
    let token_type = grammar
        .token_type
        .as_ref()
        .map_or_else(|| "void*".to_string(), |block| block.text.trim().to_string());
    writeln!(wtr, "#define {}TOKENTYPE {}", grammar.parser_name(), token_type)?;
    writeln!(wtr, "typedef union {{")?;
    writeln!(wtr, "  {}TOKENTYPE yy0;", grammar.parser_name())?;
    for (slot, text) in type_slots.iter() {
        writeln!(wtr, "  {} yy{};", text, slot)?;
    }
    if error_used {
        writeln!(wtr, "  int yy{};", error_symbol.dtnum())?;
    }
    writeln!(wtr, "}} YYMINORTYPE;")?;
    writeln!(wtr, "#define YYSTACKDEPTH {}", grammar.stack_depth())?;
    write_arg_defines(grammar, wtr)?;
    writeln!(wtr, "#define YYNSTATE {}", n_states)?;
    writeln!(wtr, "#define YYNRULE {}", n_rules)?;
    if error_used {
        writeln!(wtr, "#define YYERRORSYMBOL {}", error_symbol.ident())?;
        writeln!(wtr, "#define YYERRSYMDT yy{}", error_symbol.dtnum())?;
    }

    // The packed action table.
    driver.transfer(wtr)?;
    for (index, slot) in table.slots.iter().enumerate() {
        let next = slot.next.map_or(-1, |n| n as i64);
        writeln!(
            wtr,
            "  {{ {:3}, {:4}, {:4} }}, /* {:4}  {} */",
            slot.lookahead, next, slot.action, index, slot.comment
        )?;
    }

    // Per-state windows into the table.
    driver.transfer(wtr)?;
    for (index, state) in states.iter().enumerate() {
        writeln!(
            wtr,
            "  {{ {:5}, {:3}, {:4} }}, /* State {} */",
            table.starts[index],
            table.masks[index],
            table.defaults[index],
            state.ident()
        )?;
    }

    // Symbol names, for tracing.
    driver.transfer(wtr)?;
    for symbol in grammar.symbols.symbols() {
        writeln!(wtr, "  \"{}\",", symbol.name())?;
    }

    // Rule text, for tracing reduce actions.
    driver.transfer(wtr)?;
    for rule in grammar.rules.iter() {
        writeln!(wtr, " /* {:3} */ \"{}\",", rule.ident(), rule)?;
    }

    // Destructor dispatch.
    driver.transfer(wtr)?;
    write_destructors(grammar, wtr)?;

    // Stack overflow handler.
    driver.transfer(wtr)?;
    if let Some(code) = &grammar.stack_overflow {
        writeln!(wtr, "{}", code.text)?;
    }

    // Rule metadata used when reducing.
    driver.transfer(wtr)?;
    for rule in grammar.rules.iter() {
        writeln!(wtr, "  {{ {:3}, {:2} }},", rule.lhs().ident(), rule.len())?;
    }

    // The reduce actions themselves.
    driver.transfer(wtr)?;
    for rule in grammar.rules.iter().filter(|rule| !rule.is_augmented()) {
        writeln!(wtr, "      case {}: /* {} */", rule.ident(), rule)?;
        let body = translate_rule_code(grammar, rule);
        if !body.is_empty() {
            writeln!(wtr, "{}", body)?;
        }
        writeln!(wtr, "        break;")?;
    }

    // Failure, syntax error and accept hooks.
    driver.transfer(wtr)?;
    if let Some(code) = &grammar.parse_failure {
        writeln!(wtr, "{}", code.text)?;
    }
    driver.transfer(wtr)?;
    if let Some(code) = &grammar.syntax_error {
        writeln!(wtr, "{}", code.text)?;
    }
    driver.transfer(wtr)?;
    if let Some(code) = &grammar.parse_accept {
        writeln!(wtr, "{}", code.text)?;
    }

    driver.finish(wtr)?;
    if let Some(code) = &grammar.extra_code {
        writeln!(wtr, "{}", code.text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::parse_grammar;

    fn parsed(text: &str) -> Grammar {
        let mut grammar = Grammar::new("test.y");
        parse_grammar(text, &mut grammar);
        grammar.prepare();
        grammar
    }

    #[test]
    fn template_driver_cuts_at_markers() {
        let template = "head Parse\n%%\nmiddle\n%%\ntail ParseAlloc\n";
        let mut driver = TemplateDriver::new(template, "Calc");
        let mut out = Vec::new();
        driver.transfer(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "head Calc\n");
        let mut out = Vec::new();
        driver.transfer(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "middle\n");
        let mut out = Vec::new();
        driver.finish(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "tail CalcAlloc\n");
    }

    #[test]
    fn parse_prefix_needs_a_boundary() {
        let mut driver = TemplateDriver::new("yyParser Parse MyParse ParseFree", "Lang");
        let mut out = Vec::new();
        driver.finish(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "yyParser Lang MyParse LangFree\n"
        );
    }

    #[test]
    fn type_slots_deduplicate() {
        let grammar = parsed(
            "%type a {Expr *} %type b {Expr *} %type c {int} a ::= A . b ::= B . c ::= C . \
             s ::= a b c .",
        );
        let slots = assign_type_slots(&grammar);
        assert_eq!(slots.len(), 2);
        let a = grammar.symbols.find("a").unwrap();
        let b = grammar.symbols.find("b").unwrap();
        let c = grammar.symbols.find("c").unwrap();
        let s = grammar.symbols.find("s").unwrap();
        assert_eq!(a.dtnum(), b.dtnum());
        assert_ne!(a.dtnum(), c.dtnum());
        assert_eq!(s.dtnum(), 0);
        let error = grammar.symbols.error_symbol();
        assert_eq!(error.dtnum(), grammar.n_symbols() * 2 + 1);
    }

    #[test]
    fn aliases_rewrite_to_stack_slots() {
        let grammar = parsed("%type e {int} e(R) ::= e(L) PLUS e(X) . { R = L + X; } e ::= NUM .");
        let body = translate_rule_code(&grammar, &grammar.rules[0]);
        assert_eq!(grammar.error_count(), 0);
        let e = grammar.symbols.find("e").unwrap();
        let dt = e.dtnum();
        assert!(body.contains(&format!("yygotominor.yy{}", dt)));
        assert!(body.contains(&format!("yymsp[-2].minor.yy{}", dt)));
        assert!(body.contains(&format!("yymsp[0].minor.yy{}", dt)));
        assert!(!body.contains(" R "));
    }

    #[test]
    fn unused_alias_is_an_error() {
        let grammar = parsed("e(R) ::= NUM . { count(); }");
        translate_rule_code(&grammar, &grammar.rules[0]);
        assert_eq!(grammar.error_count(), 1);
    }

    #[test]
    fn unaliased_symbols_get_destructors() {
        let grammar = parsed("%destructor b { free($$); } a ::= b C . { use(); } b ::= B .");
        let body = translate_rule_code(&grammar, &grammar.rules[0]);
        let b = grammar.symbols.find("b").unwrap();
        assert!(body.contains(&format!("yy_destructor({},&yymsp[-1].minor);", b.ident())));
    }

    #[test]
    fn header_rewrite_is_stable() {
        let grammar = parsed("%token_prefix TK_ e ::= NUM PLUS NUM .");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.h");
        assert!(write_header(&grammar, &path).unwrap());
        let first = fs::read_to_string(&path).unwrap();
        assert!(first.contains("#define TK_NUM"));
        assert!(first.contains("#define TK_PLUS"));
        assert!(!write_header(&grammar, &path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }
}
