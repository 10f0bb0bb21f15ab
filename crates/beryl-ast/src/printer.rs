//! Source rendering of trees.
//!
//! The printer targets the concrete grammar: parsing its output yields a
//! structurally equal tree. Block-structured nodes print in statement form
//! where possible and fall back to a parenthesized `;`-separated form when
//! they occur inline.

use beryl_core::GlobalState;
use beryl_core::types::LitKind;

use crate::nodes::{CastKind, ClassDefKind, Expr, ExprKind};

/// Renders `expr` as source text.
pub fn to_source(gs: &GlobalState, expr: &Expr) -> String {
    let mut printer = Printer {
        gs,
        out: String::new(),
        indent: 0,
    };
    printer.body(expr);
    printer.out
}

const BINARY_OPS: &[&str] = &[
    "+", "-", "*", "/", "%", "<", "<=", ">", ">=", "==", "!=", "<<", "&", "|",
];

struct Printer<'a> {
    gs: &'a GlobalState,
    out: String,
    indent: usize,
}

impl Printer<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Emits a statement sequence, one statement per line.
    fn body(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::EmptyTree => {}
            ExprKind::InsSeq { stats, expr } => {
                for stat in stats {
                    self.stmt(stat);
                }
                self.stmt(expr);
            }
            _ => self.stmt(expr),
        }
    }

    fn indented(&mut self, expr: &Expr) {
        self.indent += 1;
        self.body(expr);
        self.indent -= 1;
    }

    fn stmt(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::EmptyTree => {}
            ExprKind::ClassDef {
                declared_kind,
                name,
                superclass,
                body,
            } => {
                let keyword = match declared_kind {
                    ClassDefKind::Class => "class",
                    ClassDefKind::Module => "module",
                };
                let mut header = format!("{keyword} {}", self.inline(name));
                if !superclass.is_empty_tree() {
                    header.push_str(" < ");
                    header.push_str(&self.inline(superclass));
                }
                self.line(&header);
                self.indented(body);
                self.line("end");
            }
            ExprKind::MethodDef {
                name,
                args,
                body,
                sig,
                flags,
            } => {
                if !sig.is_empty_tree() {
                    let sig = format!("sig {{ {} }}", self.inline(sig));
                    self.line(&sig);
                }
                let recv = if flags.is_self_method { "self." } else { "" };
                let mut header = format!("def {recv}{}", self.gs.show_name(*name));
                if !args.is_empty() {
                    header.push('(');
                    header.push_str(&self.params(args));
                    header.push(')');
                }
                self.line(&header);
                self.indented(body);
                self.line("end");
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let header = format!("if {}", self.inline(cond));
                self.line(&header);
                self.indented(then_branch);
                if !else_branch.is_empty_tree() {
                    self.line("else");
                    self.indented(else_branch);
                }
                self.line("end");
            }
            ExprKind::While { cond, body } => {
                let header = format!("while {}", self.inline(cond));
                self.line(&header);
                self.indented(body);
                self.line("end");
            }
            ExprKind::For {
                var,
                iterable,
                body,
            } => {
                let header = format!("for {} in {}", self.inline(var), self.inline(iterable));
                self.line(&header);
                self.indented(body);
                self.line("end");
            }
            ExprKind::Rescue {
                body,
                cases,
                else_branch,
                ensure,
            } => {
                self.line("begin");
                self.indented(body);
                for case in cases {
                    let ExprKind::RescueCase {
                        exceptions,
                        var,
                        body,
                    } = &case.kind
                    else {
                        continue;
                    };
                    let mut header = "rescue".to_string();
                    if !exceptions.is_empty() {
                        let list = exceptions
                            .iter()
                            .map(|e| self.inline(e))
                            .collect::<Vec<_>>()
                            .join(", ");
                        header.push(' ');
                        header.push_str(&list);
                    }
                    if !var.is_empty_tree() {
                        header.push_str(" => ");
                        header.push_str(&self.inline(var));
                    }
                    self.line(&header);
                    self.indented(body);
                }
                if !else_branch.is_empty_tree() {
                    self.line("else");
                    self.indented(else_branch);
                }
                if !ensure.is_empty_tree() {
                    self.line("ensure");
                    self.indented(ensure);
                }
                self.line("end");
            }
            ExprKind::Send { args, .. }
                if matches!(args.last().map(|a| &a.kind), Some(ExprKind::Block { .. })) =>
            {
                let (call, block) = self.call_parts(expr);
                let ExprKind::Block {
                    args: block_args,
                    body,
                } = &block.kind
                else {
                    unreachable!()
                };
                let mut header = call;
                header.push_str(" do");
                if !block_args.is_empty() {
                    header.push_str(" |");
                    header.push_str(&self.params(block_args));
                    header.push('|');
                }
                self.line(&header);
                self.indented(body);
                self.line("end");
            }
            _ => {
                let text = self.inline(expr);
                self.line(&text);
            }
        }
    }

    /// The call part and block node of a send that carries a block.
    fn call_parts<'e>(&mut self, expr: &'e Expr) -> (String, &'e Expr) {
        let ExprKind::Send { args, .. } = &expr.kind else {
            unreachable!()
        };
        let block = args.last().unwrap();
        let call = self.send_inline(expr);
        (call, block)
    }

    /// Renders an expression inline.
    fn inline(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::EmptyTree => "nil".to_string(),
            ExprKind::Literal { value } => self.literal(*value),
            ExprKind::SelfExpr => "self".to_string(),
            ExprKind::ZSuperArgs => "super".to_string(),
            ExprKind::Local { name, .. } | ExprKind::UnresolvedIdent { name, .. } => {
                self.gs.show_name(*name).to_string()
            }
            ExprKind::ConstantRoot => String::new(),
            ExprKind::UnresolvedConstant { scope, name } => match &scope.kind {
                ExprKind::EmptyTree => self.gs.show_name(*name).to_string(),
                _ => format!("{}::{}", self.inline(scope), self.gs.show_name(*name)),
            },
            ExprKind::ConstantLit { symbol } => self.gs.show_symbol(*symbol).to_string(),
            ExprKind::Assign { lhs, rhs } => {
                format!("{} = {}", self.inline(lhs), self.inline(rhs))
            }
            ExprKind::OpAssign { lhs, op, rhs } => format!(
                "{} {}= {}",
                self.inline(lhs),
                self.gs.show_name(*op),
                self.inline(rhs)
            ),
            ExprKind::MultiAssign { lhs, rhs } => {
                let targets = lhs
                    .iter()
                    .map(|t| self.inline(t))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{targets} = {}", self.inline(rhs))
            }
            ExprKind::Array { elems } => {
                let elems = elems
                    .iter()
                    .map(|e| self.inline(e))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{elems}]")
            }
            ExprKind::Hash { keys, values } => {
                let pairs = keys
                    .iter()
                    .zip(values)
                    .map(|(k, v)| format!("{} => {}", self.inline(k), self.inline(v)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{pairs}}}")
            }
            ExprKind::DString { parts } => {
                let mut out = String::from("\"");
                for part in parts {
                    match &part.kind {
                        ExprKind::Literal {
                            value: LitKind::Str(name),
                        } => out.push_str(&escape_str(&self.gs.show_name(*name))),
                        _ => {
                            out.push_str("#{");
                            out.push_str(&self.inline(part));
                            out.push('}');
                        }
                    }
                }
                out.push('"');
                out
            }
            ExprKind::Break { expr } => self.jump("break", expr),
            ExprKind::Next { expr } => self.jump("next", expr),
            ExprKind::Return { expr } => self.jump("return", expr),
            ExprKind::Cast {
                cast_kind,
                arg,
                type_expr,
            } => {
                let method = match cast_kind {
                    CastKind::Let => "let",
                    CastKind::Cast => "cast",
                    CastKind::Unsafe => "unsafe",
                    CastKind::Absurd => "absurd",
                };
                if type_expr.is_empty_tree() {
                    format!("T.{method}({})", self.inline(arg))
                } else {
                    format!("T.{method}({}, {})", self.inline(arg), self.inline(type_expr))
                }
            }
            ExprKind::Send { .. } => self.send_inline(expr),
            ExprKind::RuntimeMethodDefinition { name, .. } => {
                format!(":{}", self.gs.show_name(*name))
            }
            ExprKind::InsSeq { .. }
            | ExprKind::If { .. }
            | ExprKind::While { .. }
            | ExprKind::For { .. }
            | ExprKind::Rescue { .. }
            | ExprKind::ClassDef { .. }
            | ExprKind::MethodDef { .. } => {
                // Block-structured node in expression position: fall back to
                // the parenthesized `;`-separated form.
                format!("({})", self.inline_seq(expr))
            }
            ExprKind::RescueCase { .. } => String::new(),
            ExprKind::Block { .. } => String::new(),
            ExprKind::RestArg { name } => format!("*{}", self.inline(name)),
            ExprKind::BlockArg { name } => format!("&{}", self.inline(name)),
            ExprKind::ShadowArg { name } => self.inline(name),
            ExprKind::OptionalArg { name, default } => {
                format!("{} = {}", self.inline(name), self.inline(default))
            }
            ExprKind::KeywordArg { name, default } => {
                if default.is_empty_tree() {
                    format!("{}:", self.inline(name))
                } else {
                    format!("{}: {}", self.inline(name), self.inline(default))
                }
            }
        }
    }

    fn jump(&mut self, keyword: &str, expr: &Expr) -> String {
        if expr.is_empty_tree() {
            keyword.to_string()
        } else {
            format!("{keyword} {}", self.inline(expr))
        }
    }

    /// `;`-separated inline rendering for block-structured nodes.
    fn inline_seq(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::InsSeq { stats, expr } => {
                let mut parts: Vec<String> = stats.iter().map(|s| self.inline_seq(s)).collect();
                parts.push(self.inline_seq(expr));
                parts.join("; ")
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut out = format!("if {}; {}", self.inline(cond), self.inline_seq(then_branch));
                if !else_branch.is_empty_tree() {
                    out.push_str("; else; ");
                    out.push_str(&self.inline_seq(else_branch));
                }
                out.push_str("; end");
                out
            }
            ExprKind::While { cond, body } => format!(
                "while {}; {}; end",
                self.inline(cond),
                self.inline_seq(body)
            ),
            _ => self.inline(expr),
        }
    }

    fn send_inline(&mut self, expr: &Expr) -> String {
        let ExprKind::Send {
            recv,
            method,
            num_pos_args,
            args,
            ..
        } = &expr.kind
        else {
            unreachable!()
        };
        let method_name = self.gs.show_name(*method);
        let method_name = method_name.as_str();

        let has_block = matches!(args.last().map(|a| &a.kind), Some(ExprKind::Block { .. }));
        let arg_end = if has_block { args.len() - 1 } else { args.len() };
        let args = &args[..arg_end];

        // Operator form.
        if !recv.is_empty_tree() && args.len() == 1 && BINARY_OPS.contains(&method_name) {
            return format!(
                "{} {method_name} {}",
                self.inline(recv),
                self.inline(&args[0])
            );
        }
        if !recv.is_empty_tree() && args.is_empty() && method_name == "!" {
            return format!("!{}", self.inline(recv));
        }
        if !recv.is_empty_tree() && args.is_empty() && method_name == "-@" {
            return format!("-{}", self.inline(recv));
        }
        if !recv.is_empty_tree() && method_name == "[]" && !args.is_empty() {
            let index = args
                .iter()
                .map(|a| self.inline(a))
                .collect::<Vec<_>>()
                .join(", ");
            return format!("{}[{index}]", self.inline(recv));
        }

        let mut rendered = Vec::new();
        let num_pos = (*num_pos_args as usize).min(args.len());
        for arg in &args[..num_pos] {
            rendered.push(self.inline(arg));
        }
        // Keyword arguments are stored as alternating symbol keys and
        // values after the positional arguments.
        let mut kw = args[num_pos..].chunks_exact(2);
        for pair in &mut kw {
            let key = match &pair[0].kind {
                ExprKind::Literal {
                    value: LitKind::Sym(name),
                } => self.gs.show_name(*name).to_string(),
                _ => self.inline(&pair[0]),
            };
            rendered.push(format!("{key}: {}", self.inline(&pair[1])));
        }

        let mut out = String::new();
        if !recv.is_empty_tree() {
            out.push_str(&self.inline(recv));
            out.push('.');
        }
        out.push_str(method_name);
        if !rendered.is_empty() {
            out.push('(');
            out.push_str(&rendered.join(", "));
            out.push(')');
        }
        out
    }

    fn params(&mut self, args: &[Expr]) -> String {
        let (shadow, plain): (Vec<&Expr>, Vec<&Expr>) = args
            .iter()
            .partition(|arg| matches!(arg.kind, ExprKind::ShadowArg { .. }));
        let mut out = plain
            .iter()
            .map(|arg| self.inline(arg))
            .collect::<Vec<_>>()
            .join(", ");
        if !shadow.is_empty() {
            out.push_str("; ");
            out.push_str(
                &shadow
                    .iter()
                    .map(|arg| self.inline(arg))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        out
    }

    fn literal(&mut self, value: LitKind) -> String {
        match value {
            LitKind::Int(n) => n.to_string(),
            LitKind::Float(bits) => {
                let value = f64::from_bits(bits);
                if value.fract() == 0.0 && value.is_finite() {
                    format!("{value:.1}")
                } else {
                    value.to_string()
                }
            }
            LitKind::True => "true".to_string(),
            LitKind::False => "false".to_string(),
            LitKind::Nil => "nil".to_string(),
            LitKind::Str(name) => format!("\"{}\"", escape_str(&self.gs.show_name(name))),
            LitKind::Sym(name) => format!(":{}", self.gs.show_name(name)),
        }
    }
}

fn escape_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '#' => out.push_str("\\#"),
            _ => out.push(c),
        }
    }
    out
}
