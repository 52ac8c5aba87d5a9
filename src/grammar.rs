use std::{
    cell::Cell,
    io::{self, stderr, Write},
};

use crate::rule::{CodeBlock, Rule};
use crate::symbol::{Symbol, SymbolKind, SymbolTable, ACCEPT_NAME, END_NAME, ERROR_NAME};

/// Upper bound on right-hand-side length.
pub const MAXRHS: usize = 1000;

/// Stack depth compiled into the generated parser when the grammar does not
/// say otherwise.
pub const DEFAULT_STACK_SIZE: usize = 100;

/// Everything learned from one grammar file: the declaration slots, the
/// symbol table, the rule list and the running error count.  A single
/// `Grammar` is threaded by reference through every later pass.
#[derive(Debug, Default)]
pub struct Grammar {
    pub filename: String,
    pub symbols: SymbolTable,
    pub rules: Vec<Rule>,
    pub name: Option<String>,
    pub include: Option<CodeBlock>,
    pub extra_code: Option<CodeBlock>,
    pub token_destructor: Option<CodeBlock>,
    pub token_prefix: Option<String>,
    pub syntax_error: Option<CodeBlock>,
    pub parse_accept: Option<CodeBlock>,
    pub parse_failure: Option<CodeBlock>,
    pub stack_overflow: Option<CodeBlock>,
    pub extra_argument: Option<CodeBlock>,
    pub token_type: Option<CodeBlock>,
    pub stack_size: Option<String>,
    pub start_name: Option<String>,
    start: Option<Symbol>,
    error_count: Cell<u32>,
    warning_count: Cell<u32>,
    pub precedence_counter: Cell<i32>,
}

impl Grammar {
    pub fn new(filename: &str) -> Self {
        let mut grammar = Grammar::default();
        grammar.filename = filename.to_string();
        grammar
    }

    pub fn error(&self, line: usize, what: &str) {
        writeln!(stderr(), "{}:{}: Error: {}.", self.filename, line, what).expect("stderr");
        self.error_count.set(self.error_count.get() + 1);
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.get()
    }

    pub fn warning(&self, line: usize, what: &str) {
        writeln!(stderr(), "{}:{}: Warning: {}.", self.filename, line, what).expect("stderr");
        self.warning_count.set(self.warning_count.get() + 1);
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count.get()
    }

    /// The name substituted for the `Parse` prefix throughout the template.
    pub fn parser_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Parse")
    }

    pub fn stack_depth(&self) -> usize {
        match &self.stack_size {
            Some(text) => text.parse::<usize>().unwrap_or(DEFAULT_STACK_SIZE),
            None => DEFAULT_STACK_SIZE,
        }
    }

    pub fn install_rule(&mut self, rule: Rule) {
        rule.lhs().mark_as_non_terminal();
        rule.lhs().add_rule(rule.clone());
        for symbol in rule.rhs() {
            symbol.mark_used_on_rhs();
        }
        self.rules.push(rule);
    }

    /// Valid once `prepare` has run.
    pub fn start_symbol(&self) -> Symbol {
        self.start.clone().expect("grammar prepared")
    }

    /// The wrapper rule `$accept ::= start`, installed by `prepare` as the
    /// last rule.
    pub fn augmented_rule(&self) -> Rule {
        let rule = self.rules.last().expect("grammar prepared").clone();
        debug_assert!(rule.is_augmented());
        rule
    }

    pub fn n_terminals(&self) -> usize {
        self.symbols.n_terminals()
    }

    pub fn n_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn n_rules(&self) -> usize {
        self.rules.len()
    }

    /// Post-parse analysis: insert the reserved symbols, settle the start
    /// symbol, index the symbol table, infer rule precedences and compute
    /// the lambda flags and FIRST sets.
    pub fn prepare(&mut self) {
        if self.rules.is_empty() {
            self.error(1, "Empty grammar");
            return;
        }
        self.symbols.insert_pseudo(END_NAME, SymbolKind::Terminal);
        self.symbols.insert_pseudo(ERROR_NAME, SymbolKind::NonTerminal);

        let fallback = self.rules[0].lhs().clone();
        let start = match &self.start_name {
            Some(name) => match self.symbols.find(name) {
                Some(symbol) if symbol.has_rules() => symbol,
                _ => {
                    self.error(
                        0,
                        &format!(
                            "The specified start symbol \"{}\" is not \
                             a nonterminal of the grammar.  \"{}\" will be used as the \
                             start symbol instead",
                            name,
                            fallback.name()
                        ),
                    );
                    fallback.clone()
                }
            },
            None => fallback.clone(),
        };

        // The wrapper rule keeps this legal; it is still worth pointing out.
        for rule in self.rules.iter() {
            if rule.rhs().iter().any(|symbol| *symbol == start) {
                self.warning(
                    rule.line(),
                    &format!(
                        "The start symbol \"{}\" occurs on the right-hand side of a rule",
                        start.name()
                    ),
                );
                break;
            }
        }

        let accept = self.symbols.insert_pseudo(ACCEPT_NAME, SymbolKind::NonTerminal);
        let wrapper = Rule::new_augmented(self.rules.len() as u32, accept.clone(), start.clone());
        accept.add_rule(wrapper.clone());
        self.rules.push(wrapper);
        self.start = Some(start);

        self.symbols.sort_and_index();
        self.find_rule_precedences();

        for non_terminal in self.symbols.non_terminals() {
            if !non_terminal.has_rules() && !non_terminal.is_error() {
                self.error(
                    0,
                    &format!("Nonterminal \"{}\" has no rules", non_terminal.name()),
                );
            }
        }

        self.compute_lambdas();
        self.compute_firsts();
    }

    /// Rules without an explicit precedence mark adopt the leftmost
    /// right-hand-side symbol that has a precedence of its own.
    fn find_rule_precedences(&self) {
        for rule in self.rules.iter() {
            if rule.has_precsym() {
                continue;
            }
            for symbol in rule.rhs() {
                if symbol.has_precedence() {
                    rule.set_precsym(symbol.clone());
                    break;
                }
            }
        }
    }

    /// A nonterminal derives the empty string iff some rule for it has a
    /// right-hand side made entirely of such nonterminals; an empty
    /// right-hand side qualifies immediately.
    fn compute_lambdas(&self) {
        let mut progress = true;
        while progress {
            progress = false;
            for rule in self.rules.iter() {
                if rule.lhs().lambda() {
                    continue;
                }
                if rule.rhs().iter().all(|symbol| symbol.lambda()) {
                    rule.lhs().set_lambda(true);
                    progress = true;
                }
            }
        }
    }

    /// FIRST sets to a fixed point.  Scanning a right-hand side stops at
    /// the first symbol that cannot vanish; a self-reference is skipped
    /// rather than unioned, which is what keeps direct recursion finite.
    fn compute_firsts(&self) {
        let mut progress = true;
        while progress {
            progress = false;
            for rule in self.rules.iter() {
                let lhs = rule.lhs();
                for symbol in rule.rhs() {
                    if symbol.is_terminal() {
                        progress = lhs.add_first(symbol.ident()) || progress;
                        break;
                    } else if lhs == symbol {
                        if !lhs.lambda() {
                            break;
                        }
                    } else {
                        progress = lhs.union_firsts_of(symbol) || progress;
                        if !symbol.lambda() {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Echo the grammar in scannable form: a symbol cross-reference as
    /// comments, then every rule.
    pub fn reprint<W: Write>(&self, wtr: &mut W) -> io::Result<()> {
        writeln!(wtr, "// Reprint of input file \"{}\".", self.filename)?;
        writeln!(wtr, "// Symbols:")?;
        for (index, symbol) in self.symbols.names().enumerate() {
            writeln!(wtr, "//   {:3}: {}", index, symbol.name())?;
        }
        for rule in self.rules.iter().filter(|r| !r.is_augmented()) {
            write!(wtr, "{} ::=", rule.lhs().name())?;
            for symbol in rule.rhs() {
                write!(wtr, " {}", symbol.name())?;
            }
            write!(wtr, " .")?;
            if let Some(precsym) = rule.precsym() {
                write!(wtr, " [{}]", precsym.name())?;
            }
            writeln!(wtr)?;
        }
        Ok(())
    }
}
