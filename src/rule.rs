use std::{
    cell::{Cell, RefCell},
    cmp::Ordering,
    fmt,
    rc::Rc,
};

use crate::symbol::Symbol;

/// Verbatim user code with the line its opening brace was seen on.
#[derive(Debug, Clone, Default)]
pub struct CodeBlock {
    pub text: String,
    pub line: usize,
}

impl CodeBlock {
    pub fn new(text: &str, line: usize) -> Self {
        Self {
            text: text.to_string(),
            line,
        }
    }
}

pub struct RuleData {
    ident: u32,
    lhs: Symbol,
    lhs_alias: Option<String>,
    rhs: Vec<Symbol>,
    rhs_aliases: Vec<Option<String>>,
    line: usize,
    precsym: RefCell<Option<Symbol>>,
    action: RefCell<Option<CodeBlock>>,
    can_reduce: Cell<bool>,
    augmented: bool,
}

/// One grammar rule.  Rules live in the grammar's list in source order and
/// are also chained from their left-hand-side symbol.
#[derive(Clone)]
pub struct Rule(Rc<RuleData>);

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule#{}({})", self.ident(), self)
    }
}

impl Rule {
    pub fn new(
        ident: u32,
        lhs: Symbol,
        lhs_alias: Option<String>,
        rhs: Vec<Symbol>,
        rhs_aliases: Vec<Option<String>>,
        line: usize,
    ) -> Self {
        debug_assert_eq!(rhs.len(), rhs_aliases.len());
        Rule(Rc::new(RuleData {
            ident,
            lhs,
            lhs_alias,
            rhs,
            rhs_aliases,
            line,
            precsym: RefCell::new(None),
            action: RefCell::new(None),
            can_reduce: Cell::new(false),
            augmented: false,
        }))
    }

    /// The synthetic wrapper rule `$accept ::= start`.
    pub fn new_augmented(ident: u32, lhs: Symbol, start: Symbol) -> Self {
        Rule(Rc::new(RuleData {
            ident,
            lhs,
            lhs_alias: None,
            rhs: vec![start],
            rhs_aliases: vec![None],
            line: 0,
            precsym: RefCell::new(None),
            action: RefCell::new(None),
            can_reduce: Cell::new(false),
            augmented: true,
        }))
    }

    pub fn ident(&self) -> u32 {
        self.0.ident
    }

    pub fn lhs(&self) -> &Symbol {
        &self.0.lhs
    }

    pub fn lhs_alias(&self) -> Option<&str> {
        self.0.lhs_alias.as_deref()
    }

    pub fn len(&self) -> usize {
        self.0.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.rhs.is_empty()
    }

    pub fn rhs(&self) -> &[Symbol] {
        &self.0.rhs
    }

    pub fn rhs_symbol(&self, index: usize) -> Option<&Symbol> {
        self.0.rhs.get(index)
    }

    pub fn rhs_alias(&self, index: usize) -> Option<&str> {
        self.0.rhs_aliases.get(index).and_then(|a| a.as_deref())
    }

    pub fn line(&self) -> usize {
        self.0.line
    }

    pub fn is_augmented(&self) -> bool {
        self.0.augmented
    }

    pub fn precsym(&self) -> Option<Symbol> {
        self.0.precsym.borrow().clone()
    }

    pub fn has_precsym(&self) -> bool {
        self.0.precsym.borrow().is_some()
    }

    pub fn set_precsym(&self, symbol: Symbol) {
        *self.0.precsym.borrow_mut() = Some(symbol)
    }

    /// Precedence of the rule's precedence symbol, -1 when there is none.
    pub fn precedence(&self) -> i32 {
        match &*self.0.precsym.borrow() {
            Some(symbol) => symbol.precedence(),
            None => -1,
        }
    }

    pub fn associativity(&self) -> crate::symbol::Associativity {
        match &*self.0.precsym.borrow() {
            Some(symbol) => symbol.associativity(),
            None => crate::symbol::Associativity::Unknown,
        }
    }

    pub fn action(&self) -> Option<CodeBlock> {
        self.0.action.borrow().clone()
    }

    pub fn has_action(&self) -> bool {
        self.0.action.borrow().is_some()
    }

    /// Returns false if the rule already had an action.
    pub fn set_action(&self, action: CodeBlock) -> bool {
        let mut slot = self.0.action.borrow_mut();
        if slot.is_some() {
            false
        } else {
            *slot = Some(action);
            true
        }
    }

    pub fn can_reduce(&self) -> bool {
        self.0.can_reduce.get()
    }

    pub fn set_can_reduce(&self) {
        self.0.can_reduce.set(true)
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.0.ident == other.0.ident
    }
}

impl Eq for Rule {}

impl PartialOrd for Rule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.ident.cmp(&other.0.ident)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut string = format!("{} ::=", self.0.lhs.name());
        for symbol in self.0.rhs.iter() {
            string += &format!(" {}", symbol);
        }
        write!(f, "{}", string)
    }
}
