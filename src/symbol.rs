use std::{
    cell::{Cell, Ref, RefCell},
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    rc::Rc,
};

use crate::pool::StringPool;
use crate::rule::{CodeBlock, Rule};
use crate::symbol::set::TerminalSet;

pub mod set;

/// Name of the end-of-input terminal.  It sorts ahead of every legal
/// identifier, so it always lands at index 0.
pub const END_NAME: &str = "$";
/// Left-hand side of the synthetic rule wrapped around the start symbol.
pub const ACCEPT_NAME: &str = "$accept";
/// The error pseudo-nonterminal available on rule right-hand sides.
pub const ERROR_NAME: &str = "error";
/// Lookahead name carried by a state's default action.  It is appended
/// after every real symbol during indexing.
pub const DEFAULT_NAME: &str = "{default}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
    NonAssoc,
    Unknown,
}

impl Default for Associativity {
    fn default() -> Self {
        Associativity::Unknown
    }
}

impl fmt::Display for Associativity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Associativity::Left => write!(f, "left"),
            Associativity::Right => write!(f, "right"),
            Associativity::NonAssoc => write!(f, "nonassoc"),
            Associativity::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Terminal,
    NonTerminal,
}

pub struct SymbolData {
    name: Rc<str>,
    // A leading upper case letter marks a terminal, but a symbol that turns
    // up on the left of a rule is a nonterminal no matter how it is spelt.
    kind: Cell<SymbolKind>,
    ident: Cell<u32>,
    precedence: Cell<i32>,
    associativity: Cell<Associativity>,
    lambda: Cell<bool>,
    firsts: RefCell<TerminalSet>,
    data_type: RefCell<Option<CodeBlock>>,
    dtnum: Cell<usize>,
    destructor: RefCell<Option<CodeBlock>>,
    rules: RefCell<Vec<Rule>>,
    used_on_rhs: Cell<bool>,
}

#[derive(Clone)]
pub struct Symbol(Rc<SymbolData>);

// The rule chain points back at symbols, so the derived form would chase
// its own tail.
impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({}#{})", self.name(), self.ident())
    }
}

impl Symbol {
    fn new(name: Rc<str>, kind: SymbolKind) -> Self {
        Symbol(Rc::new(SymbolData {
            name,
            kind: Cell::new(kind),
            ident: Cell::new(0),
            precedence: Cell::new(-1),
            associativity: Cell::new(Associativity::Unknown),
            lambda: Cell::new(false),
            firsts: RefCell::new(TerminalSet::new()),
            data_type: RefCell::new(None),
            dtnum: Cell::new(0),
            destructor: RefCell::new(None),
            rules: RefCell::new(vec![]),
            used_on_rhs: Cell::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ident(&self) -> u32 {
        self.0.ident.get()
    }

    pub fn set_ident(&self, ident: u32) {
        self.0.ident.set(ident)
    }

    pub fn kind(&self) -> SymbolKind {
        self.0.kind.get()
    }

    pub fn is_terminal(&self) -> bool {
        self.0.kind.get() == SymbolKind::Terminal
    }

    pub fn is_non_terminal(&self) -> bool {
        self.0.kind.get() == SymbolKind::NonTerminal
    }

    /// Called when the symbol appears as a rule's left-hand side.
    pub fn mark_as_non_terminal(&self) {
        self.0.kind.set(SymbolKind::NonTerminal)
    }

    pub fn is_end(&self) -> bool {
        self.name() == END_NAME
    }

    pub fn is_error(&self) -> bool {
        self.name() == ERROR_NAME
    }

    pub fn is_default_mark(&self) -> bool {
        self.name() == DEFAULT_NAME
    }

    pub fn precedence(&self) -> i32 {
        self.0.precedence.get()
    }

    pub fn has_precedence(&self) -> bool {
        self.0.precedence.get() >= 0
    }

    pub fn set_precedence(&self, precedence: i32, associativity: Associativity) {
        self.0.precedence.set(precedence);
        self.0.associativity.set(associativity);
    }

    pub fn associativity(&self) -> Associativity {
        self.0.associativity.get()
    }

    pub fn lambda(&self) -> bool {
        self.0.lambda.get()
    }

    pub fn set_lambda(&self, lambda: bool) {
        self.0.lambda.set(lambda)
    }

    pub fn firsts(&self) -> Ref<'_, TerminalSet> {
        self.0.firsts.borrow()
    }

    pub fn add_first(&self, ident: u32) -> bool {
        self.0.firsts.borrow_mut().insert(ident)
    }

    pub fn union_firsts_of(&self, other: &Symbol) -> bool {
        self.0.firsts.borrow_mut().union_with(&other.firsts())
    }

    pub fn data_type(&self) -> Option<CodeBlock> {
        self.0.data_type.borrow().clone()
    }

    /// Returns false if a data type was already present.
    pub fn set_data_type(&self, data_type: CodeBlock) -> bool {
        let mut slot = self.0.data_type.borrow_mut();
        if slot.is_some() {
            false
        } else {
            *slot = Some(data_type);
            true
        }
    }

    pub fn dtnum(&self) -> usize {
        self.0.dtnum.get()
    }

    pub fn set_dtnum(&self, dtnum: usize) {
        self.0.dtnum.set(dtnum)
    }

    pub fn destructor(&self) -> Option<CodeBlock> {
        self.0.destructor.borrow().clone()
    }

    pub fn has_destructor(&self) -> bool {
        self.0.destructor.borrow().is_some()
    }

    /// Returns false if a destructor was already present.
    pub fn set_destructor(&self, destructor: CodeBlock) -> bool {
        let mut slot = self.0.destructor.borrow_mut();
        if slot.is_some() {
            false
        } else {
            *slot = Some(destructor);
            true
        }
    }

    pub fn add_rule(&self, rule: Rule) {
        self.0.rules.borrow_mut().push(rule)
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.0.rules.borrow().clone()
    }

    pub fn has_rules(&self) -> bool {
        !self.0.rules.borrow().is_empty()
    }

    pub fn mark_used_on_rhs(&self) {
        self.0.used_on_rhs.set(true)
    }

    pub fn is_used_on_rhs(&self) -> bool {
        self.0.used_on_rhs.get()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn kind_for_name(name: &str) -> SymbolKind {
    if name.chars().next().map_or(false, |c| c.is_ascii_uppercase()) {
        SymbolKind::Terminal
    } else {
        SymbolKind::NonTerminal
    }
}

/// All of the grammar's symbols, addressable by name before indexing and by
/// table position afterwards.  Indexing places the terminals first in
/// alphabetical order, then the nonterminals, with the default-action mark
/// appended at the very end.
#[derive(Default)]
pub struct SymbolTable {
    pool: StringPool,
    by_name: BTreeMap<Rc<str>, Symbol>,
    ordered: Vec<Symbol>,
    n_terminals: usize,
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SymbolTable({} symbols, {} terminals)",
            self.by_name.len(),
            self.n_terminals
        )
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Find a symbol, creating it if this is the first sighting.  The kind
    /// is taken from the case of the leading character.
    pub fn lookup(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.by_name.get(name) {
            symbol.clone()
        } else {
            let interned = self.pool.intern(name);
            let symbol = Symbol::new(Rc::clone(&interned), kind_for_name(name));
            self.by_name.insert(interned, symbol.clone());
            symbol
        }
    }

    pub fn find(&self, name: &str) -> Option<Symbol> {
        self.by_name.get(name).cloned()
    }

    /// Create one of the reserved symbols with an explicit kind.
    pub fn insert_pseudo(&mut self, name: &str, kind: SymbolKind) -> Symbol {
        if let Some(symbol) = self.by_name.get(name) {
            symbol.clone()
        } else {
            let interned = self.pool.intern(name);
            let symbol = Symbol::new(Rc::clone(&interned), kind);
            self.by_name.insert(interned, symbol.clone());
            symbol
        }
    }

    /// Assign table positions: terminals, then nonterminals, each class in
    /// alphabetical order, then the default-action mark last of all.
    pub fn sort_and_index(&mut self) {
        let default_mark = self.insert_pseudo(DEFAULT_NAME, SymbolKind::NonTerminal);
        let mut terminals: Vec<Symbol> = vec![];
        let mut non_terminals: Vec<Symbol> = vec![];
        for symbol in self.by_name.values() {
            if symbol.is_default_mark() {
                continue;
            }
            if symbol.is_terminal() {
                terminals.push(symbol.clone());
            } else {
                non_terminals.push(symbol.clone());
            }
        }
        self.n_terminals = terminals.len();
        self.ordered = terminals;
        self.ordered.append(&mut non_terminals);
        self.ordered.push(default_mark);
        for (index, symbol) in self.ordered.iter().enumerate() {
            symbol.set_ident(index as u32);
        }
    }

    /// All indexed symbols, including the default-action mark.
    pub fn symbols(&self) -> &[Symbol] {
        &self.ordered
    }

    pub fn terminals(&self) -> &[Symbol] {
        &self.ordered[..self.n_terminals]
    }

    /// The real nonterminals; the default-action mark is not among them.
    pub fn non_terminals(&self) -> &[Symbol] {
        &self.ordered[self.n_terminals..self.ordered.len() - 1]
    }

    pub fn n_terminals(&self) -> usize {
        self.n_terminals
    }

    /// Count of indexed symbols, the default-action mark included.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty() && self.by_name.is_empty()
    }

    pub fn default_mark(&self) -> Symbol {
        self.ordered.last().expect("indexed").clone()
    }

    pub fn end_symbol(&self) -> Symbol {
        self.find(END_NAME).expect("added before indexing")
    }

    pub fn error_symbol(&self) -> Symbol {
        self.find(ERROR_NAME).expect("added before indexing")
    }

    /// Pre-indexing iteration in name order, for the grammar reprint.
    pub fn names(&self) -> impl Iterator<Item = &Symbol> {
        self.by_name.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_leading_case() {
        let mut table = SymbolTable::new();
        assert!(table.lookup("PLUS").is_terminal());
        assert!(table.lookup("expr").is_non_terminal());
        assert!(table.lookup("Expr9").is_terminal());
    }

    #[test]
    fn lookup_is_idempotent() {
        let mut table = SymbolTable::new();
        let first = table.lookup("expr");
        let second = table.lookup("expr");
        assert_eq!(first, second);
        assert_eq!(first.name(), "expr");
    }

    #[test]
    fn indexing_sorts_terminals_first() {
        let mut table = SymbolTable::new();
        table.lookup("expr");
        table.lookup("PLUS");
        table.lookup("atom");
        table.lookup("NUM");
        table.insert_pseudo(END_NAME, SymbolKind::Terminal);
        table.sort_and_index();
        let names: Vec<&str> = table.symbols().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["$", "NUM", "PLUS", "atom", "expr", "{default}"]);
        assert_eq!(table.n_terminals(), 3);
        assert_eq!(table.end_symbol().ident(), 0);
        assert_eq!(table.default_mark().ident(), 5);
        let non_terminal_names: Vec<&str> =
            table.non_terminals().iter().map(|s| s.name()).collect();
        assert_eq!(non_terminal_names, vec!["atom", "expr"]);
    }

    #[test]
    fn lhs_reclassifies_terminal_spelling() {
        let mut table = SymbolTable::new();
        let symbol = table.lookup("Expr");
        assert!(symbol.is_terminal());
        symbol.mark_as_non_terminal();
        assert!(table.lookup("Expr").is_non_terminal());
    }
}
