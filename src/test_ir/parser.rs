//! Lift script parser.
//!
//! A lift script drives one [`RegisterFile`](crate::core::RegisterFile) per
//! block the way instruction handlers would. Every line is one statement:
//!
//! ```text
//! arch x86_64                 ; x86_64, x86_64-avx or aarch64 (default x86_64)
//! arg %a : i64                ; declare an input value
//! block entry                 ; start a block with a fresh register file
//! set r0:i32 = %a             ; write a facet (x86 names such as eax also work)
//! set xmm0:f32 = %f clear     ; clearing write
//! get %x = r0:i64             ; read a facet and name the result
//! rename r3 = r0              ; copy all facets of r0 to r3
//! merge r0                    ; combine pending partial writes of r0
//! flag zf = %z                ; write a flag
//! getflag %z2 = zf            ; read a flag
//! cmp %a, %b : zf cf          ; flags of a comparison, recorded in the flag cache
//! ip = 0x401000               ; write the instruction pointer
//! getip %pc                   ; read it
//! ```
//!
//! Values are `%name` references or integer literals typed by their use.

use thiserror::Error;

use super::{parse_type, Type};
use crate::core::{ArchConfig, BuildError, Facet, Flag, Reg, RegFileError};
use crate::x64::{map_register, parse_register, Operand};

/// Errors while parsing or running a lift script, with the 1-based line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: unknown architecture `{name}`")]
    UnknownArch { line: usize, name: String },

    #[error("line {line}: unknown value %{name}")]
    UnknownValue { line: usize, name: String },

    #[error("line {line}: %{name} is already defined")]
    Redefined { line: usize, name: String },

    #[error("line {line}: {message}")]
    Type { line: usize, message: String },

    #[error("line {line}: {source}")]
    RegFile {
        line: usize,
        #[source]
        source: RegFileError,
    },

    #[error("line {line}: {source}")]
    Build {
        line: usize,
        #[source]
        source: BuildError,
    },
}

impl ScriptError {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax { line, message: message.into() }
    }
}

/// A value operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpr {
    Named(String),
    /// Two's complement bits, truncated to the type of the use.
    Int(u128),
}

/// A register and the facet it is accessed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegSpec {
    pub reg: Reg,
    pub facet: Facet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Set { target: RegSpec, value: ValueExpr, clear: bool },
    Get { name: String, source: RegSpec },
    Rename { dst: Reg, src: Reg },
    Merge { reg: Reg },
    SetFlag { flag: Flag, value: ValueExpr },
    GetFlag { name: String, flag: Flag },
    Compare { lhs: ValueExpr, rhs: ValueExpr, flags: Vec<Flag> },
    SetIp { value: ValueExpr },
    GetIp { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgDecl {
    pub line: usize,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    pub line: usize,
    pub name: String,
    pub stmts: Vec<(usize, Stmt)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub arch: ArchConfig,
    pub args: Vec<ArgDecl>,
    pub blocks: Vec<ScriptBlock>,
}

pub fn parse_script(text: &str) -> Result<Script, ScriptError> {
    Parser::new().parse(text)
}

struct Parser {
    arch: ArchConfig,
    arch_line: Option<usize>,
    args: Vec<ArgDecl>,
    blocks: Vec<ScriptBlock>,
}

impl Parser {
    fn new() -> Self {
        Self {
            arch: ArchConfig::x86_64(),
            arch_line: None,
            args: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn parse(mut self, text: &str) -> Result<Script, ScriptError> {
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split(';').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            let (keyword, rest) = content
                .split_once(char::is_whitespace)
                .map(|(keyword, rest)| (keyword, rest.trim()))
                .unwrap_or((content, ""));
            self.parse_line(line, keyword, rest)?;
        }
        Ok(Script {
            arch: self.arch,
            args: self.args,
            blocks: self.blocks,
        })
    }

    fn parse_line(&mut self, line: usize, keyword: &str, rest: &str) -> Result<(), ScriptError> {
        match keyword {
            "arch" => self.parse_arch(line, rest),
            "arg" => self.parse_arg(line, rest),
            "block" => {
                let name = single_word(line, rest, "block name")?;
                self.blocks.push(ScriptBlock { line, name: name.to_string(), stmts: Vec::new() });
                Ok(())
            }
            _ => {
                let stmt = self.parse_stmt(line, keyword, rest)?;
                let block = self
                    .blocks
                    .last_mut()
                    .ok_or_else(|| ScriptError::syntax(line, format!("`{keyword}` outside of a block")))?;
                block.stmts.push((line, stmt));
                Ok(())
            }
        }
    }

    fn parse_arch(&mut self, line: usize, rest: &str) -> Result<(), ScriptError> {
        if self.arch_line.is_some() || !self.args.is_empty() || !self.blocks.is_empty() {
            return Err(ScriptError::syntax(line, "`arch` must be the first statement"));
        }
        let name = single_word(line, rest, "architecture")?;
        self.arch = ArchConfig::by_name(name)
            .ok_or_else(|| ScriptError::UnknownArch { line, name: name.to_string() })?;
        self.arch_line = Some(line);
        Ok(())
    }

    fn parse_arg(&mut self, line: usize, rest: &str) -> Result<(), ScriptError> {
        let (name, ty) = rest
            .split_once(':')
            .ok_or_else(|| ScriptError::syntax(line, "expected `arg %name : type`"))?;
        let name = value_name(line, name.trim())?;
        let ty = parse_type(ty)
            .ok_or_else(|| ScriptError::Type { line, message: format!("unknown type `{}`", ty.trim()) })?;
        if self.args.iter().any(|arg| arg.name == name) {
            return Err(ScriptError::Redefined { line, name });
        }
        self.args.push(ArgDecl { line, name, ty });
        Ok(())
    }

    fn parse_stmt(&self, line: usize, keyword: &str, rest: &str) -> Result<Stmt, ScriptError> {
        match keyword {
            "set" => {
                let (target, value) = assignment(line, rest)?;
                let target = self.reg_spec(line, target)?;
                let (value, clear) = match value.strip_suffix("clear") {
                    Some(value) if value.ends_with(char::is_whitespace) => (value.trim(), true),
                    _ => (value, false),
                };
                Ok(Stmt::Set { target, value: value_expr(line, value)?, clear })
            }
            "get" => {
                let (name, source) = assignment(line, rest)?;
                Ok(Stmt::Get { name: value_name(line, name)?, source: self.reg_spec(line, source)? })
            }
            "rename" => {
                let (dst, src) = assignment(line, rest)?;
                Ok(Stmt::Rename { dst: self.reg_spec(line, dst)?.reg, src: self.reg_spec(line, src)?.reg })
            }
            "merge" => Ok(Stmt::Merge { reg: self.reg_spec(line, single_word(line, rest, "register")?)?.reg }),
            "flag" => {
                let (flag, value) = assignment(line, rest)?;
                Ok(Stmt::SetFlag { flag: flag_name(line, flag)?, value: value_expr(line, value)? })
            }
            "getflag" => {
                let (name, flag) = assignment(line, rest)?;
                Ok(Stmt::GetFlag { name: value_name(line, name)?, flag: flag_name(line, flag)? })
            }
            "cmp" => {
                let (operands, flags) = rest
                    .split_once(':')
                    .ok_or_else(|| ScriptError::syntax(line, "expected `cmp %lhs, %rhs : flags`"))?;
                let (lhs, rhs) = operands
                    .split_once(',')
                    .ok_or_else(|| ScriptError::syntax(line, "expected two comparison operands"))?;
                let flags = flags
                    .split_whitespace()
                    .map(|flag| flag_name(line, flag))
                    .collect::<Result<Vec<_>, _>>()?;
                if flags.is_empty() {
                    return Err(ScriptError::syntax(line, "`cmp` defines no flags"));
                }
                Ok(Stmt::Compare { lhs: value_expr(line, lhs.trim())?, rhs: value_expr(line, rhs.trim())?, flags })
            }
            "ip" => {
                let value = rest
                    .strip_prefix('=')
                    .ok_or_else(|| ScriptError::syntax(line, "expected `ip = value`"))?;
                Ok(Stmt::SetIp { value: value_expr(line, value.trim())? })
            }
            "getip" => Ok(Stmt::GetIp { name: value_name(line, single_word(line, rest, "value name")?)? }),
            other => Err(ScriptError::syntax(line, format!("unknown statement `{other}`"))),
        }
    }

    /// `r3`, `v0:v4f32`, or an x86 register name with an optional facet.
    fn reg_spec(&self, line: usize, text: &str) -> Result<RegSpec, ScriptError> {
        let (name, facet) = match text.split_once(':') {
            Some((name, facet)) => {
                let facet = facet
                    .trim()
                    .parse::<Facet>()
                    .map_err(|err| ScriptError::syntax(line, err.to_string()))?;
                (name.trim(), Some(facet))
            }
            None => (text.trim(), None),
        };

        let numbered = |prefix: char, make: fn(u8) -> Reg| {
            name.strip_prefix(prefix)
                .and_then(|index| index.parse::<u8>().ok())
                .map(make)
        };
        if let Some(reg) = numbered('r', Reg::gp).or_else(|| numbered('v', Reg::vector)) {
            return Ok(RegSpec { reg, facet: facet.unwrap_or(Facet::I) });
        }

        if self.arch.name().starts_with("x86_64") {
            if let Some(Operand::Reg { reg, facet: natural }) = parse_register(name).and_then(map_register) {
                return Ok(RegSpec { reg, facet: facet.unwrap_or(natural) });
            }
        }
        Err(ScriptError::syntax(line, format!("unknown register `{name}`")))
    }
}

fn single_word<'t>(line: usize, text: &'t str, what: &str) -> Result<&'t str, ScriptError> {
    let mut words = text.split_whitespace();
    match (words.next(), words.next()) {
        (Some(word), None) => Ok(word),
        _ => Err(ScriptError::syntax(line, format!("expected a single {what}"))),
    }
}

fn assignment(line: usize, text: &str) -> Result<(&str, &str), ScriptError> {
    text.split_once('=')
        .map(|(lhs, rhs)| (lhs.trim(), rhs.trim()))
        .ok_or_else(|| ScriptError::syntax(line, "expected `=`"))
}

fn value_name(line: usize, text: &str) -> Result<String, ScriptError> {
    let name = text
        .strip_prefix('%')
        .ok_or_else(|| ScriptError::syntax(line, format!("expected a %value, found `{text}`")))?;
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return Err(ScriptError::syntax(line, format!("invalid value name `{text}`")));
    }
    Ok(name.to_string())
}

fn value_expr(line: usize, text: &str) -> Result<ValueExpr, ScriptError> {
    if text.starts_with('%') {
        return value_name(line, text).map(ValueExpr::Named);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text),
    };
    let parsed = match digits.strip_prefix("0x") {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => digits.parse::<u128>(),
    };
    let value = parsed.map_err(|_| ScriptError::syntax(line, format!("invalid operand `{text}`")))?;
    Ok(ValueExpr::Int(if negative { value.wrapping_neg() } else { value }))
}

fn flag_name(line: usize, text: &str) -> Result<Flag, ScriptError> {
    Flag::from_name(text.trim()).ok_or_else(|| ScriptError::syntax(line, format!("unknown flag `{text}`")))
}
