//! Textual IR parser.
//!
//! The format is line oriented: one function header, slot declaration, block
//! label, value or terminator per line. Block names may be referenced before
//! their label appears; value names must be defined before they are used.

use super::{Aux, AuxKind, BlockId, BlockKind, Function, Op, Type, ValueId};
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashMap;
use log::debug;

/// Parse every function in `text`.
pub fn parse_module(text: &str) -> CompileResult<Vec<Function>> {
    let parser = Parser::new(text);
    parser.parse()
}

struct Parser<'a> {
    text: &'a str,
    funcs: Vec<Function>,
}

/// Per-function name maps.
struct FuncState<'a> {
    func: Function,
    start_line: usize,
    blocks: HashMap<&'a str, BlockId>,
    values: HashMap<&'a str, ValueId>,
    block_resolves: Vec<Resolve<'a>>,
    current: Option<BlockId>,
    terminated: bool,
}

#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    block: BlockId,
    line: usize,
}

/// Cursor over a single line.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self { text, pos: 0, line }
    }

    fn error(&self, reason: impl Into<String>) -> CompileError {
        CompileError::Parse {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to the end of the line
                self.pos = self.text.len();
            } else if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn is_eol(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.text.len()
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.current_char()
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> CompileResult<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!(
                "expected '{}' but found {:?}",
                ch,
                self.current_char()
            )));
        }
        Ok(())
    }

    fn expect_eol(&mut self) -> CompileResult<()> {
        if !self.is_eol() {
            return Err(self.error(format!("unexpected trailing text {:?}", &self.text[self.pos..])));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> CompileResult<&'a str> {
        self.skip_whitespace();
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("expected identifier but found '{ch}'"))),
            None => return Err(self.error("expected identifier but found end of line")),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_number(&mut self) -> CompileResult<i64> {
        self.skip_whitespace();
        let negative = self.try_read('-');
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        let digits = &self.text[start..self.pos];
        let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).map(|n| n as i64),
            None => digits.parse::<i64>(),
        };
        let n = parsed.map_err(|_| self.error(format!("invalid number {digits:?}")))?;
        Ok(if negative { n.wrapping_neg() } else { n })
    }

    fn read_unsigned(&mut self) -> CompileResult<u64> {
        let n = self.read_number()?;
        u64::try_from(n).map_err(|_| self.error(format!("expected a non-negative number, got {n}")))
    }
}

impl<'a> FuncState<'a> {
    fn new(name: &str, start_line: usize) -> Self {
        Self {
            func: Function::new(name),
            start_line,
            blocks: HashMap::new(),
            values: HashMap::new(),
            block_resolves: Vec::new(),
            current: None,
            terminated: false,
        }
    }

    fn open_block(&mut self, cur: &Cursor<'a>, name: &'a str) -> CompileResult<()> {
        if self.current.is_some() && !self.terminated {
            return Err(cur.error("previous block has no terminator"));
        }
        if self.blocks.contains_key(name) {
            return Err(cur.error(format!("block {name} defined twice")));
        }
        let block = self.func.new_block(BlockKind::Exit);
        self.blocks.insert(name, block);
        self.current = Some(block);
        self.terminated = false;
        Ok(())
    }

    fn current_block(&self, cur: &Cursor<'a>) -> CompileResult<BlockId> {
        match self.current {
            Some(block) if !self.terminated => Ok(block),
            Some(_) => Err(cur.error("statement after block terminator")),
            None => Err(cur.error("statement outside of a block")),
        }
    }

    fn lookup_value(&self, cur: &Cursor<'a>, name: &str) -> CompileResult<ValueId> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| cur.error(format!("use of undefined value {name}")))
    }

    fn read_value_ref(&self, cur: &mut Cursor<'a>) -> CompileResult<ValueId> {
        let name = cur.read_identifier()?;
        self.lookup_value(cur, name)
    }

    fn read_successor(&mut self, cur: &mut Cursor<'a>, block: BlockId) -> CompileResult<()> {
        let name = cur.read_identifier()?;
        self.block_resolves.push(Resolve {
            name,
            block,
            line: cur.line,
        });
        Ok(())
    }

    fn parse_terminator(&mut self, cur: &mut Cursor<'a>, keyword: &str) -> CompileResult<bool> {
        let kind = match keyword {
            "jump" => BlockKind::Plain,
            "if" => BlockKind::If,
            "first" => BlockKind::First,
            "ret" => BlockKind::Ret,
            "exit" => BlockKind::Exit,
            _ => return Ok(false),
        };
        let block = self.current_block(cur)?;

        let control = match kind {
            BlockKind::If => Some(self.read_value_ref(cur)?),
            BlockKind::Ret if !cur.is_eol() => Some(self.read_value_ref(cur)?),
            _ => None,
        };
        for _ in 0..kind.successor_count() {
            self.read_successor(cur, block)?;
        }
        cur.expect_eol()?;

        self.func.set_control(block, kind, control);
        self.terminated = true;
        Ok(true)
    }

    fn parse_slot(&mut self, cur: &mut Cursor<'a>) -> CompileResult<()> {
        if self.current.is_some() {
            return Err(cur.error("stack slots must be declared before the first block"));
        }
        let name = cur.read_identifier()?;
        let size = cur.read_unsigned()?;
        let align = cur.read_unsigned()?;
        let needs_zero = match cur.is_eol() {
            true => false,
            false => match cur.read_identifier()? {
                "zero" => true,
                other => return Err(cur.error(format!("unknown slot flag {other:?}"))),
            },
        };
        cur.expect_eol()?;
        if self.func.frame.find_slot(name).is_some() {
            return Err(cur.error(format!("slot {name} declared twice")));
        }
        self.func.add_slot(name, size, align, needs_zero)?;
        Ok(())
    }

    fn parse_value(&mut self, cur: &mut Cursor<'a>, first: &'a str) -> CompileResult<()> {
        let block = self.current_block(cur)?;

        let (result_name, op_name) = if cur.try_read('=') {
            (Some(first), cur.read_identifier()?)
        } else {
            (None, first)
        };
        let op = Op::from_name(op_name)
            .ok_or_else(|| cur.error(format!("unknown opcode {op_name:?}")))?;

        let explicit_ty = if cur.current_char() == Some('.') {
            cur.advance();
            let ty_name = cur.read_identifier()?;
            Some(
                Type::from_name(ty_name)
                    .ok_or_else(|| cur.error(format!("unknown type {ty_name:?}")))?,
            )
        } else {
            None
        };

        let mut aux = Aux::None;
        let mut args: Vec<ValueId> = Vec::new();
        while !cur.is_eol() {
            match cur.peek() {
                Some('$') => {
                    cur.advance();
                    aux = Aux::Int(cur.read_number()?);
                }
                Some('@') => {
                    cur.advance();
                    aux = Aux::Sym(cur.read_identifier()?.to_string());
                }
                Some('%') => {
                    cur.advance();
                    let slot_name = cur.read_identifier()?;
                    let slot = self
                        .func
                        .frame
                        .find_slot(slot_name)
                        .ok_or_else(|| cur.error(format!("unknown stack slot {slot_name}")))?;
                    aux = Aux::Slot(slot);
                }
                _ => args.push(self.read_value_ref(cur)?),
            }
        }

        let info = op.info();
        let aux_kind = match aux {
            Aux::None => AuxKind::None,
            Aux::Int(_) => AuxKind::Int,
            Aux::Sym(_) => AuxKind::Sym,
            Aux::Slot(_) => AuxKind::Slot,
        };
        if aux_kind != info.aux {
            return Err(cur.error(format!(
                "{} expects a {:?} payload, found {:?}",
                op, info.aux, aux_kind
            )));
        }
        if let Some(n) = info.args {
            if args.len() != n as usize {
                return Err(cur.error(format!(
                    "{} takes {} arguments, found {}",
                    op,
                    n,
                    args.len()
                )));
            }
        }

        let ty = explicit_ty.or(info.result).unwrap_or(match op {
            Op::Copy => self.func.value(args[0]).ty,
            Op::StaticCall => Type::Void,
            _ => Type::I64,
        });

        let value = self.func.new_value(block, op, ty, &args, aux);
        if let Some(name) = result_name {
            if self.values.insert(name, value).is_some() {
                return Err(cur.error(format!("value {name} defined twice")));
            }
        }
        Ok(())
    }

    fn finish(mut self) -> CompileResult<Function> {
        if self.current.is_none() {
            return Err(CompileError::Parse {
                line: self.start_line,
                reason: format!("function {} has no blocks", self.func.name),
            });
        }
        if !self.terminated {
            return Err(CompileError::Parse {
                line: self.start_line,
                reason: format!("last block of {} has no terminator", self.func.name),
            });
        }

        for resolve in &self.block_resolves {
            let target = self.blocks.get(resolve.name).copied().ok_or_else(|| {
                CompileError::Parse {
                    line: resolve.line,
                    reason: format!("branch to undefined block {}", resolve.name),
                }
            })?;
            self.func.add_succ(resolve.block, target);
        }
        Ok(self.func)
    }
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            funcs: Vec::new(),
        }
    }

    fn parse(mut self) -> CompileResult<Vec<Function>> {
        let mut state: Option<FuncState<'a>> = None;

        for (idx, line) in self.text.lines().enumerate() {
            let mut cur = Cursor::new(line, idx + 1);
            if cur.is_eol() {
                continue;
            }

            if cur.try_read('}') {
                cur.expect_eol()?;
                let func = state
                    .take()
                    .ok_or_else(|| cur.error("unmatched '}'"))?
                    .finish()?;
                debug!("parsed function {}", func.name);
                self.funcs.push(func);
                continue;
            }

            let word = cur.read_identifier()?;
            let Some(fs) = state.as_mut() else {
                if word != "func" {
                    return Err(cur.error(format!("expected 'func' but found {word:?}")));
                }
                let name = cur.read_identifier()?;
                cur.expect('{')?;
                cur.expect_eol()?;
                state = Some(FuncState::new(name, cur.line));
                continue;
            };

            if word == "slot" && cur.peek() != Some('=') {
                fs.parse_slot(&mut cur)?;
            } else if cur.try_read(':') {
                cur.expect_eol()?;
                fs.open_block(&cur, word)?;
            } else if !fs.parse_terminator(&mut cur, word)? {
                fs.parse_value(&mut cur, word)?;
            }
        }

        if let Some(fs) = state {
            return Err(CompileError::Parse {
                line: fs.start_line,
                reason: format!("function {} is not closed", fs.func.name),
            });
        }
        Ok(self.funcs)
    }
}
