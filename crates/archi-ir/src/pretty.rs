//! Pretty-printing for instruction logs
//!
//! Human-readable dumps for inspecting what a build will commit to an
//! image, one instruction per line in runtime mnemonic form.

use crate::instr::{Instr, NamedValue, ParamList};
use archi_image::Value;
use std::fmt::Write;

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    /// Renders a human-readable form.
    fn pretty_print(&self) -> String;
}

fn fmt_value(value: &Value) -> String {
    let layout = value.layout();
    let mut out = format!("<{}x{}b", layout.count, layout.size);
    if value.flags() != 0 {
        write!(out, " flags={:#x}", value.flags()).unwrap();
    }
    out.push('>');
    out
}

fn fmt_named(values: &[NamedValue]) -> String {
    let entries: Vec<String> = values
        .iter()
        .map(|entry| format!("{}={}", entry.name, fmt_value(&entry.value)))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

fn fmt_params(params: &ParamList) -> String {
    match params {
        ParamList::Empty => "{}".to_string(),
        ParamList::Inline(values) => fmt_named(values),
        ParamList::Context(key) => format!("@{key:?}"),
    }
}

impl PrettyPrint for Instr {
    fn pretty_print(&self) -> String {
        let mnemonic = self.opcode().mnemonic();
        match self {
            Instr::Noop => mnemonic.to_string(),
            Instr::Delete { key } => format!("{mnemonic} {key:?}"),
            Instr::Copy { key, original } => format!("{mnemonic} {key:?} from {original:?}"),
            Instr::InitParameters {
                key,
                parent,
                params,
            } => {
                let mut out = format!("{mnemonic} {key:?}");
                if let Some(parent) = parent {
                    write!(out, " parent {parent:?}").unwrap();
                }
                write!(out, " {}", fmt_named(params)).unwrap();
                out
            }
            Instr::InitPointer { key, value } => {
                format!("{mnemonic} {key:?} = {}", fmt_value(value))
            }
            Instr::InitArray { key, count, flags } => {
                let mut out = format!("{mnemonic} {key:?} [{count}]");
                if *flags != 0 {
                    write!(out, " flags={flags:#x}").unwrap();
                }
                out
            }
            Instr::InitFromContext {
                key,
                source,
                params,
            } => format!("{mnemonic} {key:?} from {source:?} {}", fmt_params(params)),
            Instr::InitFromSlot {
                key,
                source,
                slot,
                params,
            } => format!(
                "{mnemonic} {key:?} from {source:?}.{slot} {}",
                fmt_params(params)
            ),
            Instr::SetToValue { key, slot, value } => {
                format!("{mnemonic} {key:?}.{slot} = {}", fmt_value(value))
            }
            Instr::SetToContextData { key, slot, source } => {
                format!("{mnemonic} {key:?}.{slot} = {source:?}")
            }
            Instr::SetToContextSlot {
                key,
                slot,
                source,
                source_slot,
            } => format!("{mnemonic} {key:?}.{slot} = {source:?}.{source_slot}"),
            Instr::Act {
                key,
                action,
                params,
            } => format!("{mnemonic} {key:?}.{action} {}", fmt_params(params)),
        }
    }
}

impl PrettyPrint for [Instr] {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        for (index, instr) in self.iter().enumerate() {
            writeln!(output, "{index:4}  {}", instr.pretty_print()).unwrap();
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Slot;

    #[test]
    fn instructions_render_one_line_each() {
        let value = Value::from_u32(7).with_flags(0x3).unwrap();
        assert_eq!(
            Instr::InitPointer {
                key: "x".into(),
                value
            }
            .pretty_print(),
            "INIT_POINTER \"x\" = <1x4b flags=0x3>"
        );
        assert_eq!(
            Instr::Delete { key: "x".into() }.pretty_print(),
            "DELETE \"x\""
        );
        assert_eq!(
            Instr::SetToContextSlot {
                key: "mat".into(),
                slot: Slot::named("albedo"),
                source: "tex".into(),
                source_slot: Slot::indexed("layers", vec![2]),
            }
            .pretty_print(),
            "SET_TO_CONTEXT_SLOT \"mat\".albedo = \"tex\".layers[2]"
        );
        assert_eq!(
            Instr::Act {
                key: "job".into(),
                action: Slot::named("run"),
                params: ParamList::Context("cfg".into()),
            }
            .pretty_print(),
            "ACT \"job\".run @\"cfg\""
        );
    }

    #[test]
    fn logs_render_numbered_lines() {
        let log = [
            Instr::Noop,
            Instr::InitArray {
                key: "grid".into(),
                count: 3,
                flags: 0,
            },
        ];
        let text = log.pretty_print();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("NOOP"));
        assert!(lines[1].contains("INIT_ARRAY \"grid\" [3]"));
    }
}
