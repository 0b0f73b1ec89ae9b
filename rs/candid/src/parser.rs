//! Reader for Candid service description (`.did`) files.
//!
//! Parsing happens in two passes. The first builds a syntax tree in which
//! declared types refer to each other by name. The second inlines every
//! name, so each resulting [`CandidType`] is self-contained: a declaration
//! that reaches itself becomes the binding site of a recursive id and the
//! cycle is closed by a [`CandidType::Reference`].

mod lexer;

use crate::tag::{CandidId, Tag};
use crate::types::{
    CandidType, CompoundKind, CompoundType, FuncArg, FuncMode, FuncType, PrimitiveType,
    ServiceType,
};
use indexmap::IndexMap;
use lexer::{Spanned, Token};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;


#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedCharacter { ch: char, offset: usize },
    #[error("unterminated {what} starting at offset {offset}")]
    Unterminated { what: &'static str, offset: usize },
    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: String },
    #[error("type '{name}' is declared more than once")]
    DuplicateDeclaration { name: String },
    #[error("field, option or method '{name}' appears more than once")]
    DuplicateField { name: String },
    #[error("type '{name}' is not declared")]
    UndeclaredType { name: String },
    #[error("type '{name}' is only defined in terms of itself")]
    CyclicAlias { name: String },
    #[error("method '{method}' does not have a function type")]
    NotAFunction { method: String },
    #[error("'{name}' is not a service type")]
    NotAService { name: String },
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("types are nested more than {max} levels deep")]
    NestedTooDeeply { max: usize },
}

/// A parsed service description.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidServiceFile {
    /// The name given in `service <name> : ...`, if any.
    pub service_reference_id: Option<CandidId>,
    /// Arguments of a service constructor, `service : (init) -> { ... }`.
    pub init_args: Vec<FuncArg>,
    /// The service itself; always a compound service type when present.
    pub service: Option<CandidType>,
    /// Every `type name = ...;` declaration, in file order, with all names
    /// inlined.
    pub declared_types: IndexMap<CandidId, CandidType>,
}

impl CandidServiceFile {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let tokens = lexer::tokenize(text)?;
        let program = Parser {
            tokens,
            position: 0,
            depth: 0,
        }
        .program()?;

        let mut resolver = Resolver::new(&program.declarations);
        let mut declared_types = IndexMap::new();
        for name in program.declarations.keys() {
            let (ty, _) = resolver.named(name)?;
            declared_types.insert(name.clone(), ty);
        }

        let mut file = CandidServiceFile {
            declared_types,
            ..Default::default()
        };
        if let Some(actor) = &program.actor {
            let mut lowest = NO_OUTER_REFERENCE;
            if let Some(init) = &actor.init {
                file.init_args = resolver.args(init, &mut lowest)?;
            }
            let service = match &actor.body {
                ActorBody::Methods(methods) => {
                    CandidType::service(resolver.service(methods, &mut lowest)?)
                }
                ActorBody::Named(name) => match resolver.named(name)? {
                    (
                        ty @ CandidType::Compound(CompoundType {
                            kind: CompoundKind::Service(_),
                            ..
                        }),
                        _,
                    ) => ty,
                    _ => {
                        return Err(ParseError::NotAService {
                            name: name.to_string(),
                        })
                    }
                },
            };
            file.service_reference_id = actor.id.clone();
            file.service = Some(service);
        }
        Ok(file)
    }

    /// Looks up a declared type by name.
    pub fn resolve(&self, name: &str) -> Result<&CandidType, ParseError> {
        self.declared_types
            .get(&CandidId::new(name))
            .ok_or_else(|| ParseError::UndeclaredType {
                name: name.to_string(),
            })
    }

    pub fn service_type(&self) -> Option<&ServiceType> {
        match &self.service {
            Some(CandidType::Compound(CompoundType {
                kind: CompoundKind::Service(service),
                ..
            })) => Some(service),
            _ => None,
        }
    }

    pub fn method(&self, name: &str) -> Option<&FuncType> {
        self.service_type()?.methods.get(&CandidId::new(name))
    }
}

impl FromStr for CandidServiceFile {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Clone, Debug)]
enum Syntax {
    Primitive(PrimitiveType),
    Named(CandidId),
    Opt(Box<Syntax>),
    Vec(Box<Syntax>),
    Record(Vec<(Tag, Syntax)>),
    Variant(Vec<(Tag, Syntax)>),
    Func(FuncSyntax),
    Service(Vec<(CandidId, MethodSyntax)>),
    /// `μname.body`
    Recursive(CandidId, Box<Syntax>),
}

type ArgSyntax = (Option<CandidId>, Syntax);

#[derive(Clone, Debug)]
struct FuncSyntax {
    args: Vec<ArgSyntax>,
    rets: Vec<ArgSyntax>,
    modes: BTreeSet<FuncMode>,
}

#[derive(Clone, Debug)]
enum MethodSyntax {
    Func(FuncSyntax),
    Named(CandidId),
}

enum ActorBody {
    Methods(Vec<(CandidId, MethodSyntax)>),
    Named(CandidId),
}

struct Actor {
    id: Option<CandidId>,
    init: Option<Vec<ArgSyntax>>,
    body: ActorBody,
}

struct Program {
    declarations: IndexMap<CandidId, Syntax>,
    actor: Option<Actor>,
}

/// Bounds type nesting in the text and in the expansion of named types.
const MAX_TYPE_NESTING: usize = 256;

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn program(mut self) -> Result<Program, ParseError> {
        let mut declarations = IndexMap::new();
        let mut actor = None;
        while let Some(token) = self.peek().cloned() {
            if actor.is_some() {
                return Err(self.unexpected("end of input"));
            }
            match token {
                Token::Ident(keyword) if keyword == "type" => {
                    self.position += 1;
                    let name = self.ident("a type name")?;
                    self.expect(Token::Equals)?;
                    let ty = self.data_type()?;
                    self.expect(Token::Semi)?;
                    if declarations.insert(name.clone(), ty).is_some() {
                        return Err(ParseError::DuplicateDeclaration {
                            name: name.to_string(),
                        });
                    }
                }
                Token::Ident(keyword) if keyword == "import" => {
                    return Err(ParseError::Unsupported("import".to_string()))
                }
                Token::Ident(keyword) if keyword == "service" => {
                    self.position += 1;
                    actor = Some(self.actor()?);
                    self.eat(&Token::Semi);
                }
                _ => return Err(self.unexpected("'type' or 'service'")),
            }
        }
        Ok(Program {
            declarations,
            actor,
        })
    }

    fn actor(&mut self) -> Result<Actor, ParseError> {
        let id = match self.peek() {
            Some(Token::Ident(_)) => Some(self.ident("a service name")?),
            _ => None,
        };
        self.expect(Token::Colon)?;
        let init = if self.peek() == Some(&Token::LParen) {
            let args = self.tuple()?;
            self.expect(Token::Arrow)?;
            Some(args)
        } else {
            None
        };
        let body = match self.peek() {
            Some(Token::LBrace) => ActorBody::Methods(self.methods()?),
            _ => ActorBody::Named(self.ident("a service type")?),
        };
        Ok(Actor { id, init, body })
    }

    fn data_type(&mut self) -> Result<Syntax, ParseError> {
        if self.depth >= MAX_TYPE_NESTING {
            return Err(ParseError::NestedTooDeeply {
                max: MAX_TYPE_NESTING,
            });
        }
        self.depth += 1;
        let syntax = self.nested_data_type();
        self.depth -= 1;
        syntax
    }

    fn nested_data_type(&mut self) -> Result<Syntax, ParseError> {
        const EXPECTED: &str = "a type";
        let (token, offset) = self.next(EXPECTED)?;
        let keyword = match token {
            Token::Mu => {
                let name = self.ident("a recursive id")?;
                self.expect(Token::Dot)?;
                let body = self.data_type()?;
                return Ok(Syntax::Recursive(name, Box::new(body)));
            }
            Token::Ident(keyword) => keyword,
            found => return Err(unexpected(EXPECTED, &found, offset)),
        };
        Ok(match keyword.as_str() {
            "opt" => Syntax::Opt(Box::new(self.data_type()?)),
            "vec" => Syntax::Vec(Box::new(self.data_type()?)),
            "blob" => Syntax::Vec(Box::new(Syntax::Primitive(PrimitiveType::Nat8))),
            "record" => Syntax::Record(self.fields(true)?),
            "variant" => Syntax::Variant(self.fields(false)?),
            "func" => Syntax::Func(self.func()?),
            "service" => Syntax::Service(self.methods()?),
            name => match PrimitiveType::from_name(name) {
                Some(primitive) => Syntax::Primitive(primitive),
                None => Syntax::Named(CandidId::new(name)),
            },
        })
    }

    /// Record fields and variant options. An unlabelled record field is
    /// numbered one past the previous field; an unlabelled variant option
    /// is a label of type `null`.
    fn fields(&mut self, record: bool) -> Result<Vec<(Tag, Syntax)>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut fields: Vec<(Tag, Syntax)> = Vec::new();
        let mut next_id = 0u32;
        while !self.eat(&Token::RBrace) {
            let labelled = self.peek_at(1) == Some(&Token::Colon);
            let (tag, ty) = match self.peek() {
                Some(Token::Nat(id)) if labelled || !record => {
                    let tag = Tag::from_id(*id);
                    self.position += 1;
                    (tag, self.field_type(labelled)?)
                }
                Some(Token::Ident(_) | Token::Text(_)) if labelled || !record => {
                    let tag = Tag::from_name(self.name()?);
                    (tag, self.field_type(labelled)?)
                }
                _ if record => (Tag::from_id(next_id), self.data_type()?),
                _ => return Err(self.unexpected("a variant option")),
            };
            if fields.iter().any(|(existing, _)| *existing == tag) {
                return Err(ParseError::DuplicateField {
                    name: tag.to_string(),
                });
            }
            next_id = tag.id().wrapping_add(1);
            fields.push((tag, ty));
            if !self.eat(&Token::Semi) {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(fields)
    }

    fn field_type(&mut self, labelled: bool) -> Result<Syntax, ParseError> {
        if labelled {
            self.expect(Token::Colon)?;
            self.data_type()
        } else {
            Ok(Syntax::Primitive(PrimitiveType::Null))
        }
    }

    fn func(&mut self) -> Result<FuncSyntax, ParseError> {
        let args = self.tuple()?;
        self.expect(Token::Arrow)?;
        let rets = self.tuple()?;
        let mut modes = BTreeSet::new();
        while let Some(Token::Ident(name)) = self.peek() {
            match FuncMode::from_name(name) {
                Some(mode) => {
                    modes.insert(mode);
                    self.position += 1;
                }
                None => break,
            }
        }
        Ok(FuncSyntax { args, rets, modes })
    }

    fn tuple(&mut self) -> Result<Vec<ArgSyntax>, ParseError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while !self.eat(&Token::RParen) {
            let name = if self.peek_at(1) == Some(&Token::Colon) {
                let name = CandidId::new(self.name()?);
                self.expect(Token::Colon)?;
                Some(name)
            } else {
                None
            };
            args.push((name, self.data_type()?));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(args)
    }

    fn methods(&mut self) -> Result<Vec<(CandidId, MethodSyntax)>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut methods: Vec<(CandidId, MethodSyntax)> = Vec::new();
        while !self.eat(&Token::RBrace) {
            let name = CandidId::new(self.name()?);
            self.expect(Token::Colon)?;
            let method = match self.peek() {
                Some(Token::LParen) => MethodSyntax::Func(self.func()?),
                _ => MethodSyntax::Named(self.ident("a function type")?),
            };
            if methods.iter().any(|(existing, _)| *existing == name) {
                return Err(ParseError::DuplicateField {
                    name: name.to_string(),
                });
            }
            methods.push((name, method));
            if !self.eat(&Token::Semi) {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(methods)
    }

    fn name(&mut self) -> Result<String, ParseError> {
        const EXPECTED: &str = "a name";
        match self.next(EXPECTED)? {
            (Token::Ident(name) | Token::Text(name), _) => Ok(name),
            (found, offset) => Err(unexpected(EXPECTED, &found, offset)),
        }
    }

    fn ident(&mut self, expected: &str) -> Result<CandidId, ParseError> {
        match self.next(expected)? {
            (Token::Ident(id), _) => Ok(CandidId::new(id)),
            (found, offset) => Err(unexpected(expected, &found, offset)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens
            .get(self.position + ahead)
            .map(|(token, _)| token)
    }

    fn next(&mut self, expected: &str) -> Result<Spanned, ParseError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| ParseError::UnexpectedEnd {
                expected: expected.to_string(),
            })?;
        self.position += 1;
        Ok(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        let found = self.peek() == Some(token);
        if found {
            self.position += 1;
        }
        found
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        let expected = token.to_string();
        let (found, offset) = self.next(&expected)?;
        if found == token {
            Ok(())
        } else {
            Err(unexpected(&expected, &found, offset))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.tokens.get(self.position) {
            Some((found, offset)) => unexpected(expected, found, *offset),
            None => ParseError::UnexpectedEnd {
                expected: expected.to_string(),
            },
        }
    }
}

fn unexpected(expected: &str, found: &Token, offset: usize) -> ParseError {
    ParseError::UnexpectedToken {
        expected: expected.to_string(),
        found: found.to_string(),
        offset,
    }
}

const NO_OUTER_REFERENCE: usize = usize::MAX;

struct Frame {
    name: CandidId,
    /// The recursive id handed out for this binding, once something
    /// refers back to it.
    id: Option<CandidId>,
    /// `μ` binders are lexically scoped; declarations are global.
    binder: bool,
}

/// Inlines named types.
///
/// Each binding that is referred to from inside its own expansion gets a
/// recursive id that no other binding in the file uses, so types resolved
/// by one resolver can be encoded together. Expansions that do not depend
/// on any enclosing binding are cached and shared.
struct Resolver<'a> {
    declarations: &'a IndexMap<CandidId, Syntax>,
    stack: Vec<Frame>,
    /// Stack position where the innermost declaration's body starts. `μ`
    /// binders below it are out of scope.
    scope_start: usize,
    closed: HashMap<CandidId, CandidType>,
    used_ids: HashSet<CandidId>,
    depth: usize,
}

impl<'a> Resolver<'a> {
    fn new(declarations: &'a IndexMap<CandidId, Syntax>) -> Self {
        Self {
            declarations,
            stack: Vec::new(),
            scope_start: 0,
            closed: HashMap::new(),
            used_ids: HashSet::new(),
            depth: 0,
        }
    }

    /// Returns the resolved type and the lowest stack position it refers
    /// to, or `NO_OUTER_REFERENCE`.
    fn named(&mut self, name: &CandidId) -> Result<(CandidType, usize), ParseError> {
        let scope_start = self.scope_start;
        let in_scope = self
            .stack
            .iter()
            .enumerate()
            .rev()
            .find(|(position, frame)| {
                frame.name == *name && (!frame.binder || *position >= scope_start)
            })
            .map(|(position, _)| position);
        if let Some(position) = in_scope {
            let id = match self.stack[position].id.clone() {
                Some(id) => id,
                None => {
                    let id = self.fresh_id(name);
                    self.stack[position].id = Some(id.clone());
                    id
                }
            };
            return Ok((CandidType::Reference(id), position));
        }
        if let Some(ty) = self.closed.get(name) {
            return Ok((ty.clone(), NO_OUTER_REFERENCE));
        }
        let declarations = self.declarations;
        let syntax = declarations
            .get(name)
            .ok_or_else(|| ParseError::UndeclaredType {
                name: name.to_string(),
            })?;
        let (ty, outer) = self.bind(name, syntax, false)?;
        if outer == NO_OUTER_REFERENCE {
            self.closed.insert(name.clone(), ty.clone());
        }
        Ok((ty, outer))
    }

    fn bind(
        &mut self,
        name: &CandidId,
        syntax: &Syntax,
        binder: bool,
    ) -> Result<(CandidType, usize), ParseError> {
        let position = self.stack.len();
        self.stack.push(Frame {
            name: name.clone(),
            id: None,
            binder,
        });
        let saved_scope = self.scope_start;
        if !binder {
            self.scope_start = position;
        }
        let mut lowest = NO_OUTER_REFERENCE;
        let resolved = self.resolve(syntax, &mut lowest);
        self.scope_start = saved_scope;
        let id = self.stack.pop().and_then(|frame| frame.id);
        let resolved = resolved?;

        let outer = if lowest < position {
            lowest
        } else {
            NO_OUTER_REFERENCE
        };
        let ty = match id {
            None => resolved,
            Some(id) => match resolved {
                CandidType::Compound(compound) => match compound.recursive_id.clone() {
                    None => CandidType::Compound(compound.with_recursive_id(id)),
                    // `type a = b` where both are referred to: one binding
                    // site, so references to `a` are redirected to `b`.
                    Some(existing) => {
                        rename_reference(CandidType::Compound(compound), &id, &existing)
                    }
                },
                _ => {
                    return Err(ParseError::CyclicAlias {
                        name: name.to_string(),
                    })
                }
            },
        };
        Ok((ty, outer))
    }

    fn fresh_id(&mut self, name: &CandidId) -> CandidId {
        let mut id = name.clone();
        let mut suffix = 0;
        while self.used_ids.contains(&id) {
            suffix += 1;
            id = CandidId::new(format!("{}_{}", name, suffix));
        }
        self.used_ids.insert(id.clone());
        id
    }

    fn resolve(&mut self, syntax: &Syntax, lowest: &mut usize) -> Result<CandidType, ParseError> {
        if self.depth >= MAX_TYPE_NESTING {
            return Err(ParseError::NestedTooDeeply {
                max: MAX_TYPE_NESTING,
            });
        }
        self.depth += 1;
        let resolved = self.resolve_nested(syntax, lowest);
        self.depth -= 1;
        resolved
    }

    fn resolve_nested(
        &mut self,
        syntax: &Syntax,
        lowest: &mut usize,
    ) -> Result<CandidType, ParseError> {
        Ok(match syntax {
            Syntax::Primitive(primitive) => CandidType::Primitive(*primitive),
            Syntax::Named(name) => {
                let (ty, outer) = self.named(name)?;
                *lowest = (*lowest).min(outer);
                ty
            }
            Syntax::Opt(inner) => CandidType::opt(self.resolve(inner, lowest)?),
            Syntax::Vec(inner) => CandidType::vector(self.resolve(inner, lowest)?),
            Syntax::Record(fields) => CandidType::record(self.fields(fields, lowest)?),
            Syntax::Variant(options) => CandidType::variant(self.fields(options, lowest)?),
            Syntax::Func(func) => CandidType::func(self.func(func, lowest)?),
            Syntax::Service(methods) => CandidType::service(self.service(methods, lowest)?),
            Syntax::Recursive(name, body) => {
                let (ty, outer) = self.bind(name, body, true)?;
                *lowest = (*lowest).min(outer);
                ty
            }
        })
    }

    fn fields(
        &mut self,
        fields: &[(Tag, Syntax)],
        lowest: &mut usize,
    ) -> Result<Vec<(Tag, CandidType)>, ParseError> {
        let mut resolved = Vec::with_capacity(fields.len());
        for (tag, syntax) in fields {
            resolved.push((tag.clone(), self.resolve(syntax, lowest)?));
        }
        Ok(resolved)
    }

    fn args(&mut self, args: &[ArgSyntax], lowest: &mut usize) -> Result<Vec<FuncArg>, ParseError> {
        let mut resolved = Vec::with_capacity(args.len());
        for (name, syntax) in args {
            resolved.push(FuncArg {
                name: name.clone(),
                ty: self.resolve(syntax, lowest)?,
            });
        }
        Ok(resolved)
    }

    fn func(&mut self, func: &FuncSyntax, lowest: &mut usize) -> Result<FuncType, ParseError> {
        Ok(FuncType {
            modes: func.modes.clone(),
            args: self.args(&func.args, lowest)?,
            rets: self.args(&func.rets, lowest)?,
        })
    }

    fn service(
        &mut self,
        methods: &[(CandidId, MethodSyntax)],
        lowest: &mut usize,
    ) -> Result<ServiceType, ParseError> {
        let mut resolved = Vec::with_capacity(methods.len());
        for (method, syntax) in methods {
            let func = match syntax {
                MethodSyntax::Func(func) => self.func(func, lowest)?,
                MethodSyntax::Named(name) => {
                    let (ty, outer) = self.named(name)?;
                    *lowest = (*lowest).min(outer);
                    match ty {
                        CandidType::Compound(CompoundType {
                            kind: CompoundKind::Func(func),
                            recursive_id: None,
                        }) => func,
                        _ => {
                            return Err(ParseError::NotAFunction {
                                method: method.to_string(),
                            })
                        }
                    }
                }
            };
            resolved.push((method.clone(), func));
        }
        Ok(ServiceType::new(resolved))
    }
}

fn rename_reference(ty: CandidType, from: &CandidId, to: &CandidId) -> CandidType {
    let rename = |ty: CandidType| rename_reference(ty, from, to);
    let rename_func = |func: FuncType| FuncType {
        modes: func.modes,
        args: func
            .args
            .into_iter()
            .map(|arg| FuncArg {
                name: arg.name,
                ty: rename(arg.ty),
            })
            .collect(),
        rets: func
            .rets
            .into_iter()
            .map(|arg| FuncArg {
                name: arg.name,
                ty: rename(arg.ty),
            })
            .collect(),
    };
    match ty {
        CandidType::Reference(id) if id == *from => CandidType::Reference(to.clone()),
        CandidType::Compound(CompoundType { kind, recursive_id }) => {
            let kind = match kind {
                CompoundKind::Vector(inner) => CompoundKind::Vector(Box::new(rename(*inner))),
                CompoundKind::Option(inner) => CompoundKind::Option(Box::new(rename(*inner))),
                CompoundKind::Record(fields) => CompoundKind::Record(
                    fields.into_iter().map(|(tag, ty)| (tag, rename(ty))).collect(),
                ),
                CompoundKind::Variant(options) => CompoundKind::Variant(
                    options.into_iter().map(|(tag, ty)| (tag, rename(ty))).collect(),
                ),
                CompoundKind::Func(func) => CompoundKind::Func(rename_func(func)),
                CompoundKind::Service(service) => CompoundKind::Service(ServiceType {
                    methods: service
                        .methods
                        .into_iter()
                        .map(|(name, func)| (name, rename_func(func)))
                        .collect(),
                }),
            };
            CandidType::Compound(CompoundType { kind, recursive_id })
        }
        other => other,
    }
}
