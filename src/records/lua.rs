use std::path::PathBuf;

use variantly::Variantly;

use crate::error::ErrorKind;
use crate::esm::{EsmError, EsmReader, EsmWriter, FourCc, RecordKind};

/// Attachment configuration of one Lua script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LuaScriptCfg {
    pub path: String,
    pub flags: u32,
    /// Record kinds the script is attached to as a local script.
    pub record_types: Vec<RecordKind>,
    pub init_data: String,
}

impl LuaScriptCfg {
    pub const GLOBAL: u32 = 0x1;
    pub const CUSTOM: u32 = 0x2;
    pub const PLAYER: u32 = 0x4;
    pub const MENU: u32 = 0x8;
}

/// Contents of an `LUAL` record, or of any number of merged sources.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LuaScriptsCfg {
    pub scripts: Vec<LuaScriptCfg>,
}

impl LuaScriptsCfg {
    pub fn load(reader: &mut EsmReader) -> Result<Self, EsmError> {
        let mut cfg = LuaScriptsCfg::default();
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"LUAS" => cfg.scripts.push(LuaScriptCfg {
                    path: sub.parse()?,
                    ..Default::default()
                }),
                b"LUAF" => {
                    let Some(script) = cfg.scripts.last_mut() else {
                        continue;
                    };
                    let mut words = sub
                        .data
                        .chunks_exact(4)
                        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
                    script.flags = words.next().unwrap_or_default();
                    script.record_types = words
                        .filter_map(|tag| RecordKind::from_tag(FourCc(tag)))
                        .collect();
                }
                b"LUAD" => {
                    if let Some(script) = cfg.scripts.last_mut() {
                        script.init_data = sub.parse()?;
                    }
                }
                _ => {}
            }
        }
        Ok(cfg)
    }

    pub fn save(&self, writer: &mut EsmWriter) {
        for script in &self.scripts {
            writer.write_string(b"LUAS", &script.path);
            let mut flags = script.flags.to_le_bytes().to_vec();
            for kind in &script.record_types {
                flags.extend_from_slice(&kind.tag().to_bytes());
            }
            writer.write_sub_raw(b"LUAF", &flags);
            writer.write_optional(b"LUAD", &script.init_data);
        }
    }

    pub fn extend(&mut self, other: &LuaScriptsCfg) {
        self.scripts.extend(other.scripts.iter().cloned());
    }
}

/// A source of Lua script configuration, in load order.
#[derive(Clone, Debug, PartialEq, Variantly)]
pub enum LuaContent {
    /// An `.omwscripts` text file, read again every time the configuration is built.
    File(PathBuf),
    Records(LuaScriptsCfg),
}

fn record_type_for_tag(tag: &str) -> Option<RecordKind> {
    Some(match tag {
        "ACTIVATOR" => RecordKind::Activator,
        "APPARATUS" => RecordKind::Apparatus,
        "ARMOR" => RecordKind::Armor,
        "BOOK" => RecordKind::Book,
        "CLOTHING" => RecordKind::Clothing,
        "CONTAINER" => RecordKind::Container,
        "CREATURE" => RecordKind::Creature,
        "DOOR" => RecordKind::Door,
        "INGREDIENT" => RecordKind::Ingredient,
        "LIGHT" => RecordKind::Light,
        "LOCKPICK" => RecordKind::Lockpick,
        "MISC_ITEM" => RecordKind::Miscellaneous,
        "NPC" => RecordKind::Npc,
        "POTION" => RecordKind::Potion,
        "PROBE" => RecordKind::Probe,
        "REPAIR" => RecordKind::Repair,
        "WEAPON" => RecordKind::Weapon,
        _ => return None,
    })
}

/// Parse the text of an `.omwscripts` file into `cfg`.
///
/// Each non-empty line that does not start with `#` has the form
/// `TAG1, TAG2: path/to/script.lua`.
pub fn parse_omw_scripts(cfg: &mut LuaScriptsCfg, text: &str) -> Result<(), ErrorKind> {
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((tags, path)) = line.split_once(':') else {
            return Err(ErrorKind::LuaConfig {
                line: number + 1,
                message: format!("no ':' in '{line}'"),
            });
        };
        let path = path.trim();
        if path.is_empty() {
            return Err(ErrorKind::LuaConfig {
                line: number + 1,
                message: "empty script path".to_string(),
            });
        }

        let mut script = LuaScriptCfg {
            path: path.to_string(),
            ..Default::default()
        };
        for tag in tags.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
            match tag {
                "GLOBAL" => script.flags |= LuaScriptCfg::GLOBAL,
                "CUSTOM" => script.flags |= LuaScriptCfg::CUSTOM,
                "PLAYER" => script.flags |= LuaScriptCfg::PLAYER,
                "MENU" => script.flags |= LuaScriptCfg::MENU,
                other => match record_type_for_tag(other) {
                    Some(kind) => script.record_types.push(kind),
                    None => {
                        return Err(ErrorKind::LuaConfig {
                            line: number + 1,
                            message: format!("unknown tag '{other}'"),
                        });
                    }
                },
            }
        }
        cfg.scripts.push(script);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::esm::RecordFlags;

    #[test]
    fn omwscripts_lines() {
        let text = "# comment\n\nGLOBAL: scripts/main.lua\nPLAYER, NPC: scripts/actor.lua\n";
        let mut cfg = LuaScriptsCfg::default();
        parse_omw_scripts(&mut cfg, text).unwrap();
        assert_eq!(cfg.scripts.len(), 2);
        assert_eq!(cfg.scripts[0].flags, LuaScriptCfg::GLOBAL);
        assert_eq!(cfg.scripts[1].flags, LuaScriptCfg::PLAYER);
        assert_eq!(cfg.scripts[1].record_types, vec![RecordKind::Npc]);
        assert_eq!(cfg.scripts[1].path, "scripts/actor.lua");
    }

    #[test]
    fn omwscripts_rejects_unknown_tags() {
        let mut cfg = LuaScriptsCfg::default();
        let err = parse_omw_scripts(&mut cfg, "GLOBAL: a.lua\nSPACESHIP: b.lua").unwrap_err();
        assert!(matches!(err, ErrorKind::LuaConfig { line: 2, .. }));
    }

    #[test]
    fn lual_records_keep_flags_and_types() {
        let cfg = LuaScriptsCfg {
            scripts: vec![LuaScriptCfg {
                path: "scripts/door.lua".to_string(),
                flags: LuaScriptCfg::CUSTOM,
                record_types: vec![RecordKind::Door, RecordKind::Container],
                init_data: String::new(),
            }],
        };
        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::LuaScripts, RecordFlags::default());
        cfg.save(&mut writer);
        writer.end_record().unwrap();

        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        reader.next_record_header().unwrap();
        assert_eq!(LuaScriptsCfg::load(&mut reader).unwrap(), cfg);
    }
}
