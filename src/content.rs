//! Loading a list of content files into an [`EsmStore`].

use std::path::PathBuf;
use std::sync::Arc;

use rootcause::prelude::*;
use tracing::{debug, info};

use crate::esm::{ContentSource, EsmReader, FileHeader, ReadersCache};
use crate::loading::Listener;
use crate::store::{EsmStore, ValidationReport};

/// A content file to load, identified by its file name.
#[derive(Clone, Debug)]
pub struct ContentFile {
    pub name: String,
    pub source: ContentSource,
}

impl ContentFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        ContentFile {
            name,
            source: ContentSource::File(path),
        }
    }

    pub fn from_memory(name: impl Into<String>, data: Vec<u8>) -> Self {
        ContentFile {
            name: name.into(),
            source: ContentSource::Memory(Arc::new(data)),
        }
    }
}

/// Content file index of each master named in `header`, looked up among the
/// files loaded before it.
fn resolve_masters(header: &FileHeader, loaded: &[ContentFile]) -> Result<Vec<i32>, Report> {
    header
        .masters
        .iter()
        .map(|master| {
            loaded
                .iter()
                .position(|file| file.name.eq_ignore_ascii_case(&master.name))
                .map(|index| index as i32)
                .ok_or_else(|| rootcause::report!("Master '{}' is not loaded before it", master.name))
        })
        .collect()
}

/// Load `files` in order, then set up and validate the store.
///
/// Every file is registered with `readers` so cell references can be read
/// again later.
pub fn load_content(
    files: &[ContentFile],
    store: &mut EsmStore,
    readers: &mut ReadersCache,
    listener: &mut dyn Listener,
) -> Result<ValidationReport, Report> {
    let mut dialogue = None;
    for (index, file) in files.iter().enumerate() {
        listener.set_label(&file.name);
        let data = file
            .source
            .open()
            .context_with(|| format!("Could not open {}", file.name))?;
        let mut reader = EsmReader::open(data, index, file.name.clone())
            .context_with(|| format!("Could not read the header of {}", file.name))?;

        let masters = resolve_masters(reader.header(), &files[..index])
            .context_with(|| format!("Could not resolve the masters of {}", file.name))?;
        debug!("{} masters: {masters:?}", file.name);
        reader.set_master_indices(masters);
        readers.register_reader(&reader);

        store
            .load(&mut reader, listener, &mut dialogue)
            .context_with(|| format!("Failed to load {}", file.name))?;
        info!("Loaded {}", file.name);
    }

    store.set_up();
    let report = store
        .validate_records(readers)
        .context("Failed to validate records")?;
    if !report.is_clean() {
        info!("Repaired content: {report:?}");
    }
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::esm::RecordKind;
    use crate::loading::{NoProgress, RecordingListener};
    use crate::records::Potion;
    use crate::testing::ContentBuilder;

    fn potion(id: &str, name: &str) -> Potion {
        Potion {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let master = ContentBuilder::new()
            .record(&potion("p_heal", "Heal"))
            .record(&potion("p_cure", "Cure"));
        let plugin = ContentBuilder::new()
            .master("morrowind.esm")
            .record(&potion("P_Heal", "Better Heal"));
        let files = vec![
            ContentFile::from_memory("Morrowind.esm", master.build()),
            ContentFile::from_memory("Better Potions.esp", plugin.build()),
        ];

        let mut store = EsmStore::new();
        let mut readers = ReadersCache::default();
        let mut listener = RecordingListener::default();
        load_content(&files, &mut store, &mut readers, &mut listener).unwrap();

        assert_eq!(store.get::<Potion>().find("p_heal").unwrap().name, "Better Heal");
        assert_eq!(store.get::<Potion>().find("p_cure").unwrap().name, "Cure");
        assert_eq!(store.find_static("p_heal"), Some(RecordKind::Potion));
        assert_eq!(readers.len(), 2);
        assert_eq!(listener.labels, ["Morrowind.esm", "Better Potions.esp"]);
    }

    #[test]
    fn missing_masters_are_reported() {
        let plugin = ContentBuilder::new()
            .master("Tribunal.esm")
            .record(&potion("p_heal", "Heal"));
        let files = vec![ContentFile::from_memory("Mournhold.esp", plugin.build())];
        let mut store = EsmStore::new();
        let err = load_content(&files, &mut store, &mut ReadersCache::default(), &mut NoProgress)
            .unwrap_err();
        let message = format!("{err}");
        assert!(message.contains("Mournhold.esp"), "{message}");
    }

    #[test]
    fn files_without_a_header_are_rejected() {
        let files = vec![ContentFile::from_memory("broken.esp", b"not a content file".to_vec())];
        let mut store = EsmStore::new();
        assert!(
            load_content(&files, &mut store, &mut ReadersCache::default(), &mut NoProgress)
                .is_err()
        );
    }

    #[test]
    fn files_on_disk_are_memory_mapped() {
        let dir = std::env::temp_dir().join(format!("esmstore-content-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Disk.esm");
        let content = ContentBuilder::new().record(&potion("p_disk", "Disk"));
        std::fs::write(&path, content.build()).unwrap();

        let file = ContentFile::from_path(&path);
        assert_eq!(file.name, "Disk.esm");
        let mut store = EsmStore::new();
        let mut readers = ReadersCache::new(1);
        load_content(&[file], &mut store, &mut readers, &mut NoProgress).unwrap();
        assert_eq!(store.get::<Potion>().find("p_disk").unwrap().name, "Disk");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
