use variantly::Variantly;
use winnow::Parser;
use winnow::binary::{le_i32, le_u32};

use crate::esm::parser_utils::{WResult, parse_fixed_string, write_fixed_string};
use crate::esm::{EsmError, EsmReader, EsmWriter, RawBytes, RecordKind, RefNum, SubRecord};
use crate::records::Record;

esm_record! {
    /// A global variable. `value_type` is `s`, `l` or `f`; the value is always stored as a float.
    pub struct Global: Global {
        value_type: u8 => one(b"FNAM"),
        value: f32 => one(b"FLTV"),
    }
}

esm_record! {
    /// A script started automatically when a game begins.
    pub struct StartScript: StartScript {
        script: String => one(b"DATA"),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GmstValue {
    #[default]
    Unset,
    String(String),
    Int(i32),
    Float(f32),
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameSetting {
    pub id: String,
    pub value: GmstValue,
}

impl GameSetting {
    /// Integer view of the setting, rounding floats like the engine does.
    pub fn int(&self) -> Option<i32> {
        match &self.value {
            GmstValue::Int(value) => Some(*value),
            GmstValue::Float(value) => Some(value.round() as i32),
            _ => None,
        }
    }

    pub fn float(&self) -> Option<f32> {
        match &self.value {
            GmstValue::Int(value) => Some(*value as f32),
            GmstValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        self.value.string_ref().map(String::as_str)
    }
}

impl Record for GameSetting {
    const KIND: RecordKind = RecordKind::GameSetting;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut setting = GameSetting::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"NAME" => setting.id = sub.parse()?,
                b"STRV" => setting.value = GmstValue::String(sub.parse()?),
                b"INTV" => setting.value = GmstValue::Int(sub.parse()?),
                b"FLTV" => setting.value = GmstValue::Float(sub.parse()?),
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        Ok((setting, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_string(b"NAME", &self.id);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        match &self.value {
            GmstValue::Unset => {}
            GmstValue::String(value) => writer.write_string(b"STRV", value),
            GmstValue::Int(value) => writer.write_sub(b"INTV", value),
            GmstValue::Float(value) => writer.write_sub(b"FLTV", value),
        }
    }
}

const SCRIPT_NAME_WIDTH: usize = 32;

/// `SCHD` of a compiled script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScriptHeader {
    pub name: String,
    pub num_shorts: u32,
    pub num_longs: u32,
    pub num_floats: u32,
    pub script_data_size: u32,
    pub local_var_size: u32,
}

impl SubRecord for ScriptHeader {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        Ok(ScriptHeader {
            name: parse_fixed_string(SCRIPT_NAME_WIDTH).parse_next(input)?,
            num_shorts: le_u32.parse_next(input)?,
            num_longs: le_u32.parse_next(input)?,
            num_floats: le_u32.parse_next(input)?,
            script_data_size: le_u32.parse_next(input)?,
            local_var_size: le_u32.parse_next(input)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_fixed_string(out, &self.name, SCRIPT_NAME_WIDTH);
        for value in [
            self.num_shorts,
            self.num_longs,
            self.num_floats,
            self.script_data_size,
            self.local_var_size,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// A compiled script. Its id is the name stored in the header.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Script {
    pub id: String,
    pub header: ScriptHeader,
    pub variables: RawBytes,
    pub bytecode: RawBytes,
    pub text: String,
}

impl Record for Script {
    const KIND: RecordKind = RecordKind::Script;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.header.name = id.clone();
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut script = Script::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"SCHD" => {
                    script.header = sub.parse()?;
                    script.id = script.header.name.clone();
                }
                b"SCVR" => script.variables = sub.parse()?,
                b"SCDT" => script.bytecode = sub.parse()?,
                b"SCTX" => script.text = sub.parse()?,
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        Ok((script, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_sub(b"SCHD", &self.header);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_optional(b"SCVR", &self.variables);
        writer.write_optional(b"SCDT", &self.bytecode);
        writer.write_optional(b"SCTX", &self.text);
    }
}

/// Value of a script local variable in a save game.
#[derive(Clone, Debug, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocalValue {
    Short(i16),
    Long(i32),
    Float(f32),
}

/// A reference a global script is running on.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetRef {
    pub id: String,
    pub ref_num: RefNum,
}

/// What a global script runs on.
#[derive(Clone, Debug, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScriptTarget {
    /// The first reference found with this id.
    Id(String),
    /// One specific placed reference.
    Reference(TargetRef),
}

impl ScriptTarget {
    pub fn target_id(&self) -> &str {
        match self {
            ScriptTarget::Id(id) => id,
            ScriptTarget::Reference(target) => &target.id,
        }
    }
}

fn parse_wide_ref_num(input: &mut &[u8]) -> WResult<RefNum> {
    Ok(RefNum {
        index: le_u32.parse_next(input)?,
        content_file: le_i32.parse_next(input)?,
    })
}

/// Running state of a global script, stored in save games as `GSCR`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalScript {
    pub id: String,
    pub locals: Vec<(String, LocalValue)>,
    pub running: bool,
    pub target: Option<ScriptTarget>,
}

impl GlobalScript {
    pub fn load(reader: &mut EsmReader) -> Result<Self, EsmError> {
        let mut script = GlobalScript {
            id: reader.get_sub_named(b"NAME")?,
            ..Default::default()
        };
        let mut target_id = None;
        let mut target_ref = None;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"LOCA" => {
                    let name = sub.parse()?;
                    let value = match reader.peek_sub_name().map(|tag| tag.to_bytes()) {
                        Some(tag) if &tag == b"STTV" => LocalValue::Short(reader.get_sub_named(b"STTV")?),
                        Some(tag) if &tag == b"INTV" => LocalValue::Long(reader.get_sub_named(b"INTV")?),
                        Some(tag) if &tag == b"FLTV" => LocalValue::Float(reader.get_sub_named(b"FLTV")?),
                        _ => continue,
                    };
                    script.locals.push((name, value));
                }
                b"RUN_" => script.running = sub.parse::<i32>()? != 0,
                b"TARG" => target_id = Some(sub.parse::<String>()?),
                b"FRMR" => target_ref = Some(sub.parse_with(parse_wide_ref_num)?),
                _ => {}
            }
        }
        script.target = match (target_id, target_ref) {
            (Some(id), Some(ref_num)) => Some(ScriptTarget::Reference(TargetRef { id, ref_num })),
            (Some(id), None) => Some(ScriptTarget::Id(id)),
            (None, _) => None,
        };
        Ok(script)
    }

    pub fn save(&self, writer: &mut EsmWriter) {
        writer.write_string(b"NAME", &self.id);
        for (name, value) in &self.locals {
            writer.write_string(b"LOCA", name);
            match value {
                LocalValue::Short(value) => writer.write_sub(b"STTV", value),
                LocalValue::Long(value) => writer.write_sub(b"INTV", value),
                LocalValue::Float(value) => writer.write_sub(b"FLTV", value),
            }
        }
        if self.running {
            writer.write_sub(b"RUN_", &1i32);
        }
        match &self.target {
            Some(ScriptTarget::Id(id)) => writer.write_string(b"TARG", id),
            Some(ScriptTarget::Reference(target)) => {
                writer.write_string(b"TARG", &target.id);
                let mut wide = Vec::with_capacity(8);
                wide.extend_from_slice(&target.ref_num.index.to_le_bytes());
                wide.extend_from_slice(&target.ref_num.content_file.to_le_bytes());
                writer.write_sub_raw(b"FRMR", &wide);
            }
            None => {}
        }
    }
}
