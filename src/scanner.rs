use crate::grammar::{Grammar, MAXRHS};
use crate::rule::{CodeBlock, Rule};
use crate::symbol::{Associativity, Symbol};

/// One lexical token.  Code blocks and strings carry their interior text
/// only; the delimiters never leave the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'t> {
    Id(&'t str),
    Arrow,
    Str(&'t str),
    Block(&'t str),
    Punct(char),
}

impl<'t> Tok<'t> {
    fn describe(&self) -> String {
        match self {
            Tok::Id(text) => (*text).to_string(),
            Tok::Arrow => "::=".to_string(),
            Tok::Str(text) => format!("\"{}\"", text),
            Tok::Block(_) => "{...}".to_string(),
            Tok::Punct(c) => c.to_string(),
        }
    }
}

/// Single pass over the whole grammar file.  Comments outside code blocks
/// are stripped here; newlines are counted everywhere, including inside
/// strings, blocks and comments.
struct Tokenizer<'t> {
    text: &'t str,
    pos: usize,
    line: usize,
}

impl<'t> Tokenizer<'t> {
    fn new(text: &'t str) -> Self {
        Self { text, pos: 0, line: 1 }
    }

    fn bytes(&self) -> &'t [u8] {
        self.text.as_bytes()
    }

    fn skip_blanks(&mut self) {
        let bytes = self.bytes();
        loop {
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                if bytes[self.pos] == b'\n' {
                    self.line += 1;
                }
                self.pos += 1;
            }
            if bytes[self.pos..].starts_with(b"//") {
                while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else if bytes[self.pos..].starts_with(b"/*") {
                self.pos += 2;
                while self.pos < bytes.len() {
                    if bytes[self.pos] == b'\n' {
                        self.line += 1;
                        self.pos += 1;
                    } else if bytes[self.pos..].starts_with(b"*/") {
                        self.pos += 2;
                        break;
                    } else {
                        self.pos += 1;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn next(&mut self, grammar: &Grammar) -> Option<(Tok<'t>, usize)> {
        self.skip_blanks();
        let bytes = self.bytes();
        if self.pos >= bytes.len() {
            return None;
        }
        let start_line = self.line;
        match bytes[self.pos] {
            b'"' => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < bytes.len() && bytes[self.pos] != b'"' {
                    if bytes[self.pos] == b'\n' {
                        self.line += 1;
                    }
                    self.pos += 1;
                }
                if self.pos >= bytes.len() {
                    grammar.error(
                        start_line,
                        "String starting on this line is not terminated before the end of the file",
                    );
                    Some((Tok::Str(&self.text[start..]), start_line))
                } else {
                    let interior = &self.text[start..self.pos];
                    self.pos += 1;
                    Some((Tok::Str(interior), start_line))
                }
            }
            b'{' => self.scan_block(grammar, start_line),
            c if c.is_ascii_alphanumeric() || c == b'_' => {
                let start = self.pos;
                while self.pos < bytes.len()
                    && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_')
                {
                    self.pos += 1;
                }
                Some((Tok::Id(&self.text[start..self.pos]), start_line))
            }
            b':' if bytes[self.pos..].starts_with(b"::=") => {
                self.pos += 3;
                Some((Tok::Arrow, start_line))
            }
            c => {
                self.pos += 1;
                Some((Tok::Punct(c as char), start_line))
            }
        }
    }

    /// Brace-delimited code.  Braces nest; comments and character or string
    /// literals inside the block are opaque, with backslash escapes honoured
    /// in literals.
    fn scan_block(&mut self, grammar: &Grammar, start_line: usize) -> Option<(Tok<'t>, usize)> {
        let bytes = self.bytes();
        self.pos += 1;
        let start = self.pos;
        let mut depth = 1usize;
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        let interior = &self.text[start..self.pos - 1];
                        return Some((Tok::Block(interior), start_line));
                    }
                }
                b'/' if bytes[self.pos..].starts_with(b"//") => {
                    while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if bytes[self.pos..].starts_with(b"/*") => {
                    self.pos += 2;
                    while self.pos < bytes.len() {
                        if bytes[self.pos] == b'\n' {
                            self.line += 1;
                            self.pos += 1;
                        } else if bytes[self.pos..].starts_with(b"*/") {
                            self.pos += 2;
                            break;
                        } else {
                            self.pos += 1;
                        }
                    }
                }
                quote @ b'\'' | quote @ b'"' => {
                    self.pos += 1;
                    while self.pos < bytes.len() {
                        let b = bytes[self.pos];
                        if b == quote {
                            self.pos += 1;
                            break;
                        }
                        if b == b'\n' {
                            self.line += 1;
                        }
                        if b == b'\\' {
                            self.pos += 1;
                            if self.pos < bytes.len() {
                                if bytes[self.pos] == b'\n' {
                                    self.line += 1;
                                }
                                self.pos += 1;
                            }
                        } else {
                            self.pos += 1;
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
        grammar.error(
            start_line,
            "C code starting on this line is not terminated before the end of the file",
        );
        Some((Tok::Block(&self.text[start..]), start_line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PState {
    WaitingForDeclOrRule,
    WaitingForDeclKeyword,
    WaitingForDeclArg,
    WaitingForPrecedenceSymbol,
    WaitingForArrow,
    InRhs,
    LhsAlias1,
    LhsAlias2,
    LhsAlias3,
    RhsAlias1,
    RhsAlias2,
    PrecedenceMark1,
    PrecedenceMark2,
    WaitingForDestructorSymbol,
    WaitingForDatatypeSymbol,
    ResyncAfterRuleError,
    ResyncAfterDeclError,
}

#[derive(Debug, Clone)]
enum DeclSlot {
    Name,
    Include,
    ExtraCode,
    TokenDestructor,
    TokenPrefix,
    SyntaxError,
    ParseAccept,
    ParseFailure,
    StackOverflow,
    ExtraArgument,
    TokenType,
    StackSize,
    StartSymbol,
    Destructor(Symbol),
    Datatype(Symbol),
}

fn starts_alpha(text: &str) -> bool {
    text.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
}

fn starts_upper(text: &str) -> bool {
    text.chars().next().map_or(false, |c| c.is_ascii_uppercase())
}

/// The rule under construction.  It is flushed into the grammar when the
/// closing `.` arrives and abandoned wholesale on a rule error.
#[derive(Default)]
struct RuleBuilder {
    lhs: Option<Symbol>,
    lhs_alias: Option<String>,
    rhs: Vec<Symbol>,
    aliases: Vec<Option<String>>,
    line: usize,
}

pub fn parse_grammar(text: &str, grammar: &mut Grammar) {
    let mut tokenizer = Tokenizer::new(text);
    let mut state = PState::WaitingForDeclOrRule;
    let mut builder = RuleBuilder::default();
    let mut prev_rule: Option<Rule> = None;
    let mut decl_slot: Option<DeclSlot> = None;
    let mut decl_keyword = String::new();
    let mut decl_assoc = Associativity::Unknown;

    while let Some((tok, line)) = tokenizer.next(grammar) {
        state = match state {
            PState::WaitingForDeclOrRule => match tok {
                Tok::Punct('%') => PState::WaitingForDeclKeyword,
                // Declarations may be closed with the same terminator as
                // rules.
                Tok::Punct('.') => PState::WaitingForDeclOrRule,
                Tok::Id(x) if starts_alpha(x) => {
                    builder.lhs = Some(grammar.symbols.lookup(x));
                    builder.lhs_alias = None;
                    builder.rhs.clear();
                    builder.aliases.clear();
                    builder.line = line;
                    PState::WaitingForArrow
                }
                Tok::Block(code) => {
                    match &prev_rule {
                        None => grammar.error(
                            line,
                            "There is no prior rule upon which to attach the code \
                             fragment which begins on this line",
                        ),
                        Some(rule) => {
                            if !rule.set_action(CodeBlock::new(code, line)) {
                                grammar.error(
                                    line,
                                    "Code fragment beginning on this line is not the first \
                                     to follow the previous rule",
                                );
                            }
                        }
                    }
                    PState::WaitingForDeclOrRule
                }
                Tok::Punct('[') => PState::PrecedenceMark1,
                other => {
                    grammar.error(
                        line,
                        &format!(
                            "Token \"{}\" should be either \"%\" or a nonterminal name",
                            other.describe()
                        ),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::WaitingForArrow => match tok {
                Tok::Arrow => PState::InRhs,
                Tok::Punct('(') => PState::LhsAlias1,
                _ => {
                    grammar.error(
                        line,
                        &format!(
                            "Expected to see a \"::=\" following the LHS symbol \"{}\"",
                            builder.lhs.as_ref().map_or("?", |s| s.name())
                        ),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::LhsAlias1 => match tok {
                Tok::Id(x) if starts_alpha(x) => {
                    builder.lhs_alias = Some(x.to_string());
                    PState::LhsAlias2
                }
                other => {
                    grammar.error(
                        line,
                        &format!(
                            "\"{}\" is not a valid alias for the LHS \"{}\"",
                            other.describe(),
                            builder.lhs.as_ref().map_or("?", |s| s.name())
                        ),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::LhsAlias2 => match tok {
                Tok::Punct(')') => PState::LhsAlias3,
                _ => {
                    grammar.error(
                        line,
                        &format!(
                            "Missing \")\" following LHS alias name \"{}\"",
                            builder.lhs_alias.as_deref().unwrap_or("?")
                        ),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::LhsAlias3 => match tok {
                Tok::Arrow => PState::InRhs,
                _ => {
                    grammar.error(
                        line,
                        &format!(
                            "Missing \"::=\" following: \"{}({})\"",
                            builder.lhs.as_ref().map_or("?", |s| s.name()),
                            builder.lhs_alias.as_deref().unwrap_or("?")
                        ),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::InRhs => match tok {
                Tok::Punct('.') => {
                    let lhs = builder.lhs.take().expect("rule in progress");
                    let rule = Rule::new(
                        grammar.rules.len() as u32,
                        lhs,
                        builder.lhs_alias.take(),
                        std::mem::take(&mut builder.rhs),
                        std::mem::take(&mut builder.aliases),
                        builder.line,
                    );
                    grammar.install_rule(rule.clone());
                    prev_rule = Some(rule);
                    PState::WaitingForDeclOrRule
                }
                Tok::Id(x) if starts_alpha(x) => {
                    if builder.rhs.len() >= MAXRHS {
                        grammar.error(
                            line,
                            &format!("Too many symbols on RHS of rule beginning at \"{}\"", x),
                        );
                        PState::ResyncAfterRuleError
                    } else {
                        builder.rhs.push(grammar.symbols.lookup(x));
                        builder.aliases.push(None);
                        PState::InRhs
                    }
                }
                Tok::Punct('(') if !builder.rhs.is_empty() => PState::RhsAlias1,
                other => {
                    grammar.error(
                        line,
                        &format!("Illegal character on RHS of rule: \"{}\"", other.describe()),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::RhsAlias1 => match tok {
                Tok::Id(x) if starts_alpha(x) => {
                    *builder.aliases.last_mut().expect("rhs nonempty") = Some(x.to_string());
                    PState::RhsAlias2
                }
                other => {
                    grammar.error(
                        line,
                        &format!(
                            "\"{}\" is not a valid alias for the RHS symbol \"{}\"",
                            other.describe(),
                            builder.rhs.last().map_or("?", |s| s.name())
                        ),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::RhsAlias2 => match tok {
                Tok::Punct(')') => PState::InRhs,
                _ => {
                    grammar.error(
                        line,
                        &format!(
                            "Missing \")\" following RHS alias name \"{}\"",
                            builder
                                .aliases
                                .last()
                                .and_then(|a| a.as_deref())
                                .unwrap_or("?")
                        ),
                    );
                    PState::ResyncAfterRuleError
                }
            },
            PState::WaitingForDeclKeyword => match tok {
                Tok::Id(x) if starts_alpha(x) => {
                    decl_keyword = x.to_string();
                    match x {
                        "name" => {
                            decl_slot = Some(DeclSlot::Name);
                            PState::WaitingForDeclArg
                        }
                        "include" => {
                            decl_slot = Some(DeclSlot::Include);
                            PState::WaitingForDeclArg
                        }
                        "code" => {
                            decl_slot = Some(DeclSlot::ExtraCode);
                            PState::WaitingForDeclArg
                        }
                        "token_destructor" => {
                            decl_slot = Some(DeclSlot::TokenDestructor);
                            PState::WaitingForDeclArg
                        }
                        "token_prefix" => {
                            decl_slot = Some(DeclSlot::TokenPrefix);
                            PState::WaitingForDeclArg
                        }
                        "syntax_error" => {
                            decl_slot = Some(DeclSlot::SyntaxError);
                            PState::WaitingForDeclArg
                        }
                        "parse_accept" => {
                            decl_slot = Some(DeclSlot::ParseAccept);
                            PState::WaitingForDeclArg
                        }
                        "parse_failure" => {
                            decl_slot = Some(DeclSlot::ParseFailure);
                            PState::WaitingForDeclArg
                        }
                        "stack_overflow" => {
                            decl_slot = Some(DeclSlot::StackOverflow);
                            PState::WaitingForDeclArg
                        }
                        "extra_argument" => {
                            decl_slot = Some(DeclSlot::ExtraArgument);
                            PState::WaitingForDeclArg
                        }
                        "token_type" => {
                            decl_slot = Some(DeclSlot::TokenType);
                            PState::WaitingForDeclArg
                        }
                        "stack_size" => {
                            decl_slot = Some(DeclSlot::StackSize);
                            PState::WaitingForDeclArg
                        }
                        "start_symbol" => {
                            decl_slot = Some(DeclSlot::StartSymbol);
                            PState::WaitingForDeclArg
                        }
                        "left" => {
                            decl_assoc = Associativity::Left;
                            grammar
                                .precedence_counter
                                .set(grammar.precedence_counter.get() + 1);
                            PState::WaitingForPrecedenceSymbol
                        }
                        "right" => {
                            decl_assoc = Associativity::Right;
                            grammar
                                .precedence_counter
                                .set(grammar.precedence_counter.get() + 1);
                            PState::WaitingForPrecedenceSymbol
                        }
                        "nonassoc" => {
                            decl_assoc = Associativity::NonAssoc;
                            grammar
                                .precedence_counter
                                .set(grammar.precedence_counter.get() + 1);
                            PState::WaitingForPrecedenceSymbol
                        }
                        "destructor" => PState::WaitingForDestructorSymbol,
                        "type" => PState::WaitingForDatatypeSymbol,
                        _ => {
                            grammar.error(
                                line,
                                &format!("Unknown declaration keyword: \"%{}\"", x),
                            );
                            PState::ResyncAfterDeclError
                        }
                    }
                }
                other => {
                    grammar.error(
                        line,
                        &format!("Illegal declaration keyword: \"{}\"", other.describe()),
                    );
                    PState::ResyncAfterDeclError
                }
            },
            PState::WaitingForDeclArg => {
                let slot = decl_slot.take().expect("keyword seen");
                if assign_decl_arg(grammar, &decl_keyword, slot, tok, line) {
                    PState::WaitingForDeclOrRule
                } else {
                    PState::ResyncAfterDeclError
                }
            }
            PState::WaitingForPrecedenceSymbol => match tok {
                Tok::Punct('.') => PState::WaitingForDeclOrRule,
                Tok::Id(x) if starts_upper(x) => {
                    let symbol = grammar.symbols.lookup(x);
                    if symbol.has_precedence() {
                        grammar.error(
                            line,
                            &format!("Symbol \"{}\" has already been given a precedence", x),
                        );
                    } else {
                        symbol.set_precedence(grammar.precedence_counter.get(), decl_assoc);
                    }
                    PState::WaitingForPrecedenceSymbol
                }
                other => {
                    grammar.error(
                        line,
                        &format!("Can't assign a precedence to \"{}\"", other.describe()),
                    );
                    PState::WaitingForPrecedenceSymbol
                }
            },
            PState::PrecedenceMark1 => {
                match tok {
                    Tok::Id(x) if starts_upper(x) => match &prev_rule {
                        None => grammar.error(
                            line,
                            &format!("There is no prior rule to assign precedence \"[{}]\"", x),
                        ),
                        Some(rule) => {
                            if rule.has_precsym() {
                                grammar.error(
                                    line,
                                    "Precedence mark on this line is not the first \
                                     to follow the previous rule",
                                );
                            } else {
                                rule.set_precsym(grammar.symbols.lookup(x));
                            }
                        }
                    },
                    _ => grammar.error(line, "The precedence symbol must be a terminal"),
                }
                PState::PrecedenceMark2
            }
            PState::PrecedenceMark2 => match tok {
                Tok::Punct(']') => PState::WaitingForDeclOrRule,
                _ => {
                    grammar.error(line, "Missing \"]\" on precedence mark");
                    PState::WaitingForDeclOrRule
                }
            },
            PState::WaitingForDestructorSymbol => match tok {
                Tok::Id(x) if starts_alpha(x) => {
                    decl_slot = Some(DeclSlot::Destructor(grammar.symbols.lookup(x)));
                    PState::WaitingForDeclArg
                }
                _ => {
                    grammar.error(line, "Symbol name missing after %destructor keyword");
                    PState::ResyncAfterDeclError
                }
            },
            PState::WaitingForDatatypeSymbol => match tok {
                Tok::Id(x) if starts_alpha(x) => {
                    decl_slot = Some(DeclSlot::Datatype(grammar.symbols.lookup(x)));
                    PState::WaitingForDeclArg
                }
                _ => {
                    grammar.error(line, "Symbol name missing after %type keyword");
                    PState::ResyncAfterDeclError
                }
            },
            PState::ResyncAfterRuleError | PState::ResyncAfterDeclError => match tok {
                Tok::Punct('.') => PState::WaitingForDeclOrRule,
                Tok::Punct('%') => PState::WaitingForDeclKeyword,
                _ => state,
            },
        };
    }

    match state {
        PState::WaitingForDeclOrRule
        | PState::ResyncAfterRuleError
        | PState::ResyncAfterDeclError => (),
        _ => grammar.error(
            tokenizer.line,
            "Input ends in the middle of a rule or declaration",
        ),
    }
}

/// Store a declaration argument into its grammar slot, reporting a mismatch
/// between what the keyword wants and what the token is.  Returns false
/// when the parser should resynchronize.
fn assign_decl_arg(
    grammar: &mut Grammar,
    keyword: &str,
    slot: DeclSlot,
    tok: Tok,
    line: usize,
) -> bool {
    fn illegal(grammar: &Grammar, keyword: &str, tok: &Tok, line: usize) -> bool {
        grammar.error(
            line,
            &format!("Illegal argument to %{}: \"{}\"", keyword, tok.describe()),
        );
        false
    }

    match slot {
        DeclSlot::Name => match tok {
            Tok::Id(x) if starts_alpha(x) => {
                if grammar.name.is_some() {
                    grammar.error(line, "Duplicate \"%name\" declaration");
                } else {
                    grammar.name = Some(x.to_string());
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::TokenPrefix => match tok {
            Tok::Id(x) => {
                if grammar.token_prefix.is_some() {
                    grammar.error(line, "Duplicate \"%token_prefix\" declaration");
                } else {
                    grammar.token_prefix = Some(x.to_string());
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::StartSymbol => match tok {
            Tok::Id(x) if starts_alpha(x) => {
                if grammar.start_name.is_some() {
                    grammar.error(line, "Duplicate \"%start_symbol\" declaration");
                } else {
                    grammar.start_name = Some(x.to_string());
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::StackSize => match tok {
            Tok::Id(x) if x.parse::<usize>().map_or(false, |depth| depth > 0) => {
                grammar.stack_size = Some(x.to_string());
                true
            }
            other => {
                grammar.error(line, &format!("Illegal stack size: \"{}\"", other.describe()));
                false
            }
        },
        DeclSlot::Include => match tok {
            Tok::Block(code) => {
                append_code(&mut grammar.include, code, line);
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::ExtraCode => match tok {
            Tok::Block(code) => {
                append_code(&mut grammar.extra_code, code, line);
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::TokenDestructor => match tok {
            Tok::Block(code) => {
                if grammar.token_destructor.is_some() {
                    grammar.error(line, "Duplicate \"%token_destructor\" declaration");
                } else {
                    grammar.token_destructor = Some(CodeBlock::new(code, line));
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::SyntaxError => match tok {
            Tok::Block(code) => {
                if grammar.syntax_error.is_some() {
                    grammar.error(line, "Duplicate \"%syntax_error\" declaration");
                } else {
                    grammar.syntax_error = Some(CodeBlock::new(code, line));
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::ParseAccept => match tok {
            Tok::Block(code) => {
                if grammar.parse_accept.is_some() {
                    grammar.error(line, "Duplicate \"%parse_accept\" declaration");
                } else {
                    grammar.parse_accept = Some(CodeBlock::new(code, line));
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::ParseFailure => match tok {
            Tok::Block(code) => {
                if grammar.parse_failure.is_some() {
                    grammar.error(line, "Duplicate \"%parse_failure\" declaration");
                } else {
                    grammar.parse_failure = Some(CodeBlock::new(code, line));
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::StackOverflow => match tok {
            Tok::Block(code) => {
                if grammar.stack_overflow.is_some() {
                    grammar.error(line, "Duplicate \"%stack_overflow\" declaration");
                } else {
                    grammar.stack_overflow = Some(CodeBlock::new(code, line));
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::ExtraArgument => match tok {
            Tok::Block(code) => {
                if grammar.extra_argument.is_some() {
                    grammar.error(line, "Duplicate \"%extra_argument\" declaration");
                } else {
                    grammar.extra_argument = Some(CodeBlock::new(code, line));
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::TokenType => match tok {
            Tok::Block(code) => {
                if grammar.token_type.is_some() {
                    grammar.error(line, "Duplicate \"%token_type\" declaration");
                } else {
                    grammar.token_type = Some(CodeBlock::new(code, line));
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::Destructor(symbol) => match tok {
            Tok::Block(code) => {
                if !symbol.set_destructor(CodeBlock::new(code, line)) {
                    grammar.error(
                        line,
                        &format!("Symbol \"{}\" already has a destructor", symbol.name()),
                    );
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
        DeclSlot::Datatype(symbol) => match tok {
            Tok::Block(code) => {
                if !symbol.set_data_type(CodeBlock::new(code, line)) {
                    grammar.error(
                        line,
                        &format!("Symbol \"{}\" already has a data type", symbol.name()),
                    );
                }
                true
            }
            _ => illegal(grammar, keyword, &tok, line),
        },
    }
}

fn append_code(slot: &mut Option<CodeBlock>, code: &str, line: usize) {
    match slot {
        Some(block) => {
            block.text.push('\n');
            block.text.push_str(code);
        }
        None => *slot = Some(CodeBlock::new(code, line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(text: &str) -> Grammar {
        let mut grammar = Grammar::new("test.y");
        parse_grammar(text, &mut grammar);
        grammar
    }

    #[test]
    fn minimal_grammar() {
        let grammar = parsed("prog ::= stmt . stmt ::= ID EQ expr . expr ::= NUM .");
        assert_eq!(grammar.rules.len(), 3);
        assert_eq!(grammar.error_count(), 0);
        assert_eq!(grammar.rules[1].len(), 3);
        assert!(grammar.symbols.find("EQ").unwrap().is_terminal());
        assert!(grammar.symbols.find("prog").unwrap().is_non_terminal());
    }

    #[test]
    fn empty_rhs_is_accepted() {
        let grammar = parsed("opt ::= . opt ::= X .");
        assert_eq!(grammar.error_count(), 0);
        assert!(grammar.rules[0].is_empty());
    }

    #[test]
    fn comments_are_stripped() {
        let grammar = parsed(
            "// leading comment\nprog ::= A /* inline */ B . /* trailing\nspans lines */ prog ::= C .",
        );
        assert_eq!(grammar.error_count(), 0);
        assert_eq!(grammar.rules.len(), 2);
        assert_eq!(grammar.rules[0].len(), 2);
    }

    #[test]
    fn code_block_attaches_to_previous_rule() {
        let grammar = parsed("r ::= A . { act(); /* } in comment */ s = \"}\"; }");
        assert_eq!(grammar.error_count(), 0);
        let action = grammar.rules[0].action().unwrap();
        assert!(action.text.contains("act();"));
        assert!(action.text.contains("s = \"}\";"));
    }

    #[test]
    fn nested_braces_survive() {
        let grammar = parsed("r ::= A . { if (x) { y(); } }");
        assert_eq!(grammar.error_count(), 0);
        assert!(grammar.rules[0].action().unwrap().text.contains("{ y(); }"));
    }

    #[test]
    fn second_code_block_is_an_error() {
        let grammar = parsed("r ::= A . { one(); } { two(); }");
        assert_eq!(grammar.error_count(), 1);
        assert!(grammar.rules[0].action().unwrap().text.contains("one"));
    }

    #[test]
    fn aliases_are_recorded() {
        let grammar = parsed("expr(E) ::= expr(A) PLUS expr(B) . { E = A + B; }");
        assert_eq!(grammar.error_count(), 0);
        let rule = &grammar.rules[0];
        assert_eq!(rule.lhs_alias(), Some("E"));
        assert_eq!(rule.rhs_alias(0), Some("A"));
        assert_eq!(rule.rhs_alias(1), None);
        assert_eq!(rule.rhs_alias(2), Some("B"));
    }

    #[test]
    fn precedence_declarations() {
        let grammar = parsed("%left PLUS MINUS. %right POW. e ::= A .");
        let plus = grammar.symbols.find("PLUS").unwrap();
        let minus = grammar.symbols.find("MINUS").unwrap();
        let pow = grammar.symbols.find("POW").unwrap();
        assert_eq!(plus.precedence(), 1);
        assert_eq!(minus.precedence(), 1);
        assert_eq!(pow.precedence(), 2);
        assert_eq!(plus.associativity(), Associativity::Left);
        assert_eq!(pow.associativity(), Associativity::Right);
    }

    #[test]
    fn duplicate_precedence_is_an_error() {
        let grammar = parsed("%left PLUS. %right PLUS. e ::= A .");
        assert_eq!(grammar.error_count(), 1);
    }

    #[test]
    fn precedence_mark_applies_to_previous_rule() {
        let grammar = parsed("%right UMINUS. e ::= MINUS e . [UMINUS] e ::= NUM .");
        assert_eq!(grammar.error_count(), 0);
        assert_eq!(grammar.rules[0].precsym().unwrap().name(), "UMINUS");
    }

    #[test]
    fn declaration_slots_fill() {
        let grammar = parsed(
            "%name Calc %token_prefix TK_ %token_type {Token} %extra_argument {int *pOut} \
             %stack_size 500 %include { #include <assert.h> } e ::= A .",
        );
        assert_eq!(grammar.error_count(), 0);
        assert_eq!(grammar.parser_name(), "Calc");
        assert_eq!(grammar.token_prefix.as_deref(), Some("TK_"));
        assert_eq!(grammar.token_type.as_ref().unwrap().text.trim(), "Token");
        assert_eq!(grammar.stack_depth(), 500);
        assert!(grammar.include.as_ref().unwrap().text.contains("assert.h"));
    }

    #[test]
    fn destructor_and_type_declarations() {
        let grammar = parsed("%destructor e { free_expr($$); } %type e {Expr *} e ::= A .");
        assert_eq!(grammar.error_count(), 0);
        let e = grammar.symbols.find("e").unwrap();
        assert!(e.has_destructor());
        assert_eq!(e.data_type().unwrap().text.trim(), "Expr *");
    }

    #[test]
    fn declaration_terminator_is_tolerated() {
        let grammar = parsed("%start_symbol s. s ::= A .");
        assert_eq!(grammar.error_count(), 0);
        assert_eq!(grammar.start_name.as_deref(), Some("s"));
    }

    #[test]
    fn unknown_keyword_resyncs() {
        let grammar = parsed("%bogus stuff . e ::= A .");
        assert_eq!(grammar.error_count(), 1);
        assert_eq!(grammar.rules.len(), 1);
    }

    #[test]
    fn rule_error_resyncs_on_dot() {
        let grammar = parsed("e ::= ::= junk . f ::= A .");
        assert_eq!(grammar.error_count(), 1);
        assert_eq!(grammar.rules.len(), 1);
        assert_eq!(grammar.rules[0].lhs().name(), "f");
    }

    #[test]
    fn unterminated_block_is_reported() {
        let grammar = parsed("e ::= A . { never closed");
        assert_eq!(grammar.error_count(), 1);
    }

    #[test]
    fn line_numbers_count_through_comments() {
        let grammar = parsed("/* one\ntwo\nthree */\ne ::= A .\n{ code(); }");
        assert_eq!(grammar.error_count(), 0);
        assert_eq!(grammar.rules[0].line(), 4);
        assert_eq!(grammar.rules[0].action().unwrap().line, 5);
    }
}
