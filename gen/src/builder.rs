// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! retrorom generation Builder objects and functions

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use retrorom_config::chip::{ChipClass, CsLine, CsLogic};
use retrorom_config::fw::ServeAlg;
use retrorom_config::hw::HardwareProfile;
use retrorom_config::mcu::Variant;

use crate::image::{CsConfig, MAX_SET_IMAGES, RomImage, RomSet, RomSetType, SizeHandling};
use crate::meta::Metadata;
use crate::{CONFIG_VERSION, Error, FIRMWARE_SIZE, Result};

/// Main Builder object
///
/// Model is to create the builder from a JSON config, retrieve the list of
/// files that need to be loaded, call `add_file` for each file once loaded,
/// then call `build` to generate the firmware blob.
///
/// # Example
/// ```no_run
/// use retrorom_config::fw::ServeAlg;
/// use retrorom_config::hw::HardwareProfile;
/// use retrorom_config::mcu::Variant;
/// # use retrorom_gen::Error;
/// use retrorom_gen::builder::{BuildProperties, Builder, FileData};
///
/// # fn read_file(path: &str) -> Result<Vec<u8>, Error> {
/// #     Ok(vec![0u8; 8192])
/// # }
/// #
/// let json = r#"{
///     "version": 1,
///     "description": "Example ROM configuration",
///     "roms": [{ "file": "kernal.bin", "type": "2364", "cs1": "active_low" }]
/// }"#;
///
/// let mut builder = Builder::from_json(json)?;
///
/// for spec in builder.file_specs() {
///     let data = read_file(&spec.source)?;
///     builder.add_file(FileData { id: spec.id, data })?;
/// }
///
/// let props = BuildProperties::new(HardwareProfile::Rev24F, Variant::F411RE);
/// let blob = builder.build(&props)?;
/// # Ok::<(), retrorom_gen::Error>(())
/// ```
#[derive(Debug)]
pub struct Builder {
    config: Config,
    sets: Vec<SetGroup>,
    files: BTreeMap<usize, Vec<u8>>,
    file_id_map: BTreeMap<usize, usize>,
}

// ROM entries making up one set, by index into the config
#[derive(Debug, Clone)]
struct SetGroup {
    roms: Vec<usize>,
}

impl Builder {
    /// Create from JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json).map_err(|e| Error::InvalidConfig {
            error: e.to_string(),
        })?;
        Self::from_config(config)
    }

    /// Create from an already parsed config
    pub fn from_config(config: Config) -> Result<Self> {
        let sets = Self::group_sets(&config);
        Self::validate_config(&config, &sets)?;

        let mut builder = Self {
            config,
            sets,
            files: BTreeMap::new(),
            file_id_map: BTreeMap::new(),
        };
        builder.build_file_id_map();

        Ok(builder)
    }

    /// Get a reference to the config
    pub fn config(&self) -> &Config {
        &self.config
    }

    // Entries sharing a set number form one set, in order of first
    // appearance.  Entries without one are sets of their own.
    fn group_sets(config: &Config) -> Vec<SetGroup> {
        let mut sets: Vec<SetGroup> = Vec::new();
        let mut numbered: BTreeMap<usize, usize> = BTreeMap::new();

        for (rom_id, rom) in config.roms.iter().enumerate() {
            match rom.set {
                Some(set_num) => match numbered.get(&set_num) {
                    Some(&index) => sets[index].roms.push(rom_id),
                    None => {
                        numbered.insert(set_num, sets.len());
                        sets.push(SetGroup { roms: vec![rom_id] });
                    }
                },
                None => sets.push(SetGroup { roms: vec![rom_id] }),
            }
        }

        sets
    }

    fn validate_config(config: &Config, sets: &[SetGroup]) -> Result<()> {
        if config.version != CONFIG_VERSION {
            return Err(Error::UnsupportedConfigVersion {
                version: config.version,
            });
        }

        if config.roms.is_empty() {
            return Err(Error::NoImages);
        }

        for (rom_num, rom) in config.roms.iter().enumerate() {
            if rom.file.is_empty() {
                return Err(Error::InvalidConfig {
                    error: format!("ROM {rom_num} file name is empty"),
                });
            }

            // Check that CS lines the class doesn't have are not specified
            for (line, logic) in [(CsLine::Cs2, rom.cs2), (CsLine::Cs3, rom.cs3)] {
                if logic.is_some() && !rom.class.has_cs_line(line) {
                    return Err(Error::InvalidConfig {
                        error: format!(
                            "{} specified for ROM {rom_num}, type {} which does not use it",
                            line.name().to_uppercase(),
                            rom.class
                        ),
                    });
                }
            }
        }

        for group in sets {
            if group.roms.len() > MAX_SET_IMAGES {
                return Err(Error::TooManyImages {
                    expected: MAX_SET_IMAGES,
                    actual: group.roms.len(),
                });
            }

            let first = &config.roms[group.roms[0]];

            // Serving algorithm, if given more than once, must agree
            let mut serve_alg = None;
            for &rom_id in &group.roms {
                let rom = &config.roms[rom_id];
                match (serve_alg, rom.serve_alg) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(Error::InvalidConfig {
                            error: format!("ROM {rom_id} serve_alg {b} conflicts with {a}"),
                        });
                    }
                    (None, Some(b)) => serve_alg = Some(b),
                    _ => {}
                }
            }

            // Multi-image sets share CS1 logic
            if group.roms.len() > 1 {
                for &rom_id in &group.roms[1..] {
                    let rom = &config.roms[rom_id];
                    if rom.cs1 != first.cs1 {
                        return Err(Error::InconsistentCsLogic {
                            first: first.cs1,
                            other: rom.cs1,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn build_file_id_map(&mut self) {
        let mut seen_files: BTreeMap<&str, usize> = BTreeMap::new();

        for (rom_id, rom) in self.config.roms.iter().enumerate() {
            let next_id = seen_files.len();
            let file_id = *seen_files.entry(rom.file.as_str()).or_insert(next_id);
            self.file_id_map.insert(rom_id, file_id);
        }
    }

    /// Get list of files that need to be loaded
    pub fn file_specs(&self) -> Vec<FileSpec> {
        let mut specs: Vec<FileSpec> = Vec::new();

        for (set_id, group) in self.sets.iter().enumerate() {
            for &rom_id in &group.roms {
                let rom = &self.config.roms[rom_id];
                let file_id = self.file_id_map[&rom_id];
                if specs.iter().any(|spec| spec.id == file_id) {
                    continue;
                }
                specs.push(FileSpec {
                    id: file_id,
                    description: rom.description.clone(),
                    source: rom.file.clone(),
                    size_handling: rom.size_handling,
                    class: rom.class,
                    rom_size: rom.class.size_bytes(),
                    set_id,
                });
            }
        }

        specs.sort_by_key(|spec| spec.id);
        specs
    }

    /// Add a loaded file - called multiple times, once for each file that
    /// has been loaded
    pub fn add_file(&mut self, file: FileData) -> Result<()> {
        if self.files.contains_key(&file.id) {
            return Err(Error::DuplicateFile { id: file.id });
        }

        if file.id >= self.total_file_count() {
            return Err(Error::InvalidConfig {
                error: format!(
                    "File {} out of range, only {} files",
                    file.id,
                    self.total_file_count()
                ),
            });
        }

        self.files.insert(file.id, file.data);
        Ok(())
    }

    fn total_file_count(&self) -> usize {
        self.file_id_map
            .values()
            .max()
            .map(|max| max + 1)
            .unwrap_or(0)
    }

    /// Number of ROM sets the config describes
    pub fn num_rom_sets(&self) -> usize {
        self.sets.len()
    }

    /// Creates the ROM sets from the config and loaded files.
    ///
    /// `default_serve_alg` is used for sets which don't specify one.
    pub fn rom_sets(&self, default_serve_alg: ServeAlg) -> Result<Vec<RomSet>> {
        for id in 0..self.total_file_count() {
            if !self.files.contains_key(&id) {
                return Err(Error::MissingFile { id });
            }
        }

        let mut rom_sets = Vec::with_capacity(self.sets.len());
        for (set_id, group) in self.sets.iter().enumerate() {
            let mut images = Vec::with_capacity(group.roms.len());
            let mut serve_alg = None;

            for &rom_id in &group.roms {
                let rom = &self.config.roms[rom_id];
                let file_id = self.file_id_map[&rom_id];
                let data = self
                    .files
                    .get(&file_id)
                    .ok_or(Error::MissingFile { id: file_id })?;

                let image = RomImage::from_raw_rom_image(
                    rom_id,
                    rom.file.clone(),
                    rom.label.clone(),
                    data,
                    rom.class,
                    CsConfig::new(rom.cs1, rom.cs2, rom.cs3),
                    rom.size_handling,
                )?;
                images.push(image);
                serve_alg = serve_alg.or(rom.serve_alg);
            }

            let set_type = if images.len() > 1 {
                RomSetType::Multi
            } else {
                RomSetType::Single
            };
            let serve_alg = serve_alg.unwrap_or(default_serve_alg);
            rom_sets.push(RomSet::new(set_id, set_type, serve_alg, images)?);
        }

        Ok(rom_sets)
    }

    /// Builds the firmware blob: the layout summary followed by each set's
    /// combined image.
    pub fn build(&self, props: &BuildProperties) -> Result<Vec<u8>> {
        let rom_sets = self.rom_sets(props.serve_alg)?;
        let metadata = Metadata::new(props.profile.mapping(), rom_sets, props.filenames);

        let size = metadata.len();
        let available = props.mcu.flash_kb() * 1024 - FIRMWARE_SIZE;
        if size > available {
            return Err(Error::TooLargeForFlash { size, available });
        }

        let mut buf = vec![0u8; size];
        metadata.write_all(&mut buf)?;

        Ok(buf)
    }

    pub fn description(&self) -> String {
        let mut desc = String::new();

        if let Some(name) = self.config.name.as_ref() {
            desc.push_str(name);
            desc.push('\n');
            desc.push_str(&"-".repeat(name.len()));
            desc.push_str("\n\n");
        }

        desc.push_str(&self.config.description);
        desc.push_str("\n\nSets:\n");

        for (ii, group) in self.sets.iter().enumerate() {
            desc.push_str(&format!("{ii}:"));
            for &rom_id in &group.roms {
                let rom = &self.config.roms[rom_id];
                desc.push(' ');
                desc.push_str(rom.description.as_deref().unwrap_or(&rom.file));
                desc.push_str(&format!(" ({})", rom.class));
            }
            desc.push('\n');
        }

        if let Some(notes) = &self.config.notes {
            desc.push('\n');
            desc.push_str(notes);
        } else {
            // Strip trailing \n
            desc.pop();
        }

        desc
    }
}

/// Properties of the firmware being built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProperties {
    pub profile: HardwareProfile,
    pub mcu: Variant,

    /// Used for sets which don't specify an algorithm
    pub serve_alg: ServeAlg,

    /// Whether to embed filenames in the blob
    pub filenames: bool,
}

impl BuildProperties {
    pub fn new(profile: HardwareProfile, mcu: Variant) -> Self {
        Self {
            profile,
            mcu,
            serve_alg: ServeAlg::default(),
            filenames: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileSpec {
    pub id: usize,

    pub description: Option<String>,

    pub source: String,

    pub size_handling: SizeHandling,

    pub class: ChipClass,

    pub rom_size: usize,

    /// First set this file is used in
    pub set_id: usize,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct FileData {
    pub id: usize,

    pub data: Vec<u8>,
}

/// ROM configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub version: u32,

    pub name: Option<String>,

    #[serde(default)]
    pub description: String,

    pub roms: Vec<RomConfig>,

    pub notes: Option<String>,
}

/// A single ROM entry in the configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RomConfig {
    pub file: String,

    pub description: Option<String>,

    #[serde(rename = "type")]
    pub class: ChipClass,

    pub cs1: CsLogic,

    #[serde(default)]
    pub cs2: Option<CsLogic>,

    #[serde(default)]
    pub cs3: Option<CsLogic>,

    /// Entries sharing a set number are served together
    #[serde(default)]
    pub set: Option<usize>,

    #[serde(default)]
    pub size_handling: SizeHandling,

    #[serde(default)]
    pub serve_alg: Option<ServeAlg>,

    /// Replaces the filename in the blob
    #[serde(default)]
    pub label: Option<String>,
}
