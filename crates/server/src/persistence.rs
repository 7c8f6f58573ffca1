//! Directory-backed provider.
//!
//! Layout under the world directory:
//!
//! ```text
//! level.json                          name + current tick
//! <dimension>/columns/c.X.Z.nbt.gz    one gzip'd NBT compound per column
//! ```
//!
//! Sections are stored palette-compressed with the same bit packing Anvil
//! uses, but the palette holds raw block ids instead of block names.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use strata_engine::world::block::BlockId;
use strata_engine::world::chunk::{Chunk, ChunkSection, SECTION_VOLUME};
use strata_engine::world::dimension::Dimension;
use strata_engine::world::position::{BlockPos, ChunkPos};
use strata_engine::world::settings::Settings;

use crate::provider::{Provider, StoredColumn, StoredEntity};

/// Written into every stored column so the format can evolve.
const DATA_VERSION: i32 = 1;
const LEVEL_FILE: &str = "level.json";

// ── Stored structs (serde) ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
struct LevelJson {
    name: String,
    current_tick: i64,
    #[serde(default)]
    data_version: i32,
}

#[derive(Serialize, Deserialize, Debug)]
struct ColumnNbt {
    #[serde(rename = "DataVersion")]
    data_version: i32,
    #[serde(rename = "xPos")]
    x_pos: i32,
    #[serde(rename = "zPos")]
    z_pos: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sections: Vec<SectionNbt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    entities: Vec<EntityNbt>,
}

#[derive(Serialize, Deserialize, Debug)]
struct SectionNbt {
    #[serde(rename = "Y")]
    y: i32,
    palette: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Vec<i64>>,
}

#[derive(Serialize, Deserialize, Debug)]
struct EntityNbt {
    id: String,
    x: i64,
    y: i64,
    z: i64,
}

// ── Bit-packing helpers ──────────────────────────────────────────────────────

/// Pack 4096 palette indices into a `Vec<i64>`.
///
/// `bits_per_entry` = max(4, ceil(log2(palette_len))).
/// Entries are packed sequentially into i64s with no entry spanning two longs.
fn pack_indices(indices: &[u16; SECTION_VOLUME], palette_len: usize) -> Option<Vec<i64>> {
    if palette_len <= 1 {
        return None; // single-block section, no data array needed
    }
    let bits = bits_per_entry(palette_len);
    let entries_per_long = 64 / bits;
    let num_longs = SECTION_VOLUME.div_ceil(entries_per_long);
    let mask = (1u64 << bits) - 1;

    let mut longs = vec![0i64; num_longs];
    for (i, &idx) in indices.iter().enumerate() {
        let long_idx = i / entries_per_long;
        let bit_offset = (i % entries_per_long) * bits;
        longs[long_idx] |= ((idx as u64 & mask) << bit_offset) as i64;
    }
    Some(longs)
}

/// Unpack palette indices from a `Vec<i64>` back into 4096 entries.
/// Missing longs decode as index 0.
fn unpack_indices(data: &[i64], palette_len: usize) -> [u16; SECTION_VOLUME] {
    let bits = bits_per_entry(palette_len);
    let entries_per_long = 64 / bits;
    let mask = (1u64 << bits) - 1;

    let mut indices = [0u16; SECTION_VOLUME];
    for (i, idx) in indices.iter_mut().enumerate() {
        let long_idx = i / entries_per_long;
        let bit_offset = (i % entries_per_long) * bits;
        if let Some(&long) = data.get(long_idx) {
            *idx = ((long as u64 >> bit_offset) & mask) as u16;
        }
    }
    indices
}

fn bits_per_entry(palette_len: usize) -> usize {
    let raw = if palette_len <= 1 {
        0
    } else {
        (usize::BITS - (palette_len - 1).leading_zeros()) as usize
    };
    raw.max(4)
}

// ── Conversion ───────────────────────────────────────────────────────────────

fn section_to_nbt(index: i32, section: &ChunkSection) -> SectionNbt {
    let mut palette_map: HashMap<BlockId, u16> = HashMap::new();
    let mut palette: Vec<i32> = Vec::new();
    let mut indices = [0u16; SECTION_VOLUME];

    for (slot, &block) in indices.iter_mut().zip(section.blocks().iter()) {
        *slot = *palette_map.entry(block).or_insert_with(|| {
            palette.push(block.0 as i32);
            (palette.len() - 1) as u16
        });
    }

    let data = pack_indices(&indices, palette.len());
    SectionNbt {
        y: index,
        palette,
        data,
    }
}

fn column_to_nbt(pos: ChunkPos, chunk: &Chunk, entities: &[StoredEntity]) -> ColumnNbt {
    let mut sections: Vec<SectionNbt> = chunk
        .sections()
        .map(|(index, section)| section_to_nbt(index, section))
        .collect();
    sections.sort_by_key(|s| s.y);

    ColumnNbt {
        data_version: DATA_VERSION,
        x_pos: pos.x,
        z_pos: pos.z,
        sections,
        entities: entities
            .iter()
            .map(|e| EntityNbt {
                id: e.kind.clone(),
                x: e.pos.x,
                y: e.pos.y,
                z: e.pos.z,
            })
            .collect(),
    }
}

fn nbt_to_column(nbt: ColumnNbt) -> StoredColumn {
    let mut chunk = Chunk::new();

    for section in &nbt.sections {
        if section.palette.is_empty() {
            continue;
        }
        let palette: Vec<BlockId> = section
            .palette
            .iter()
            .map(|&raw| match u16::try_from(raw) {
                Ok(id) => BlockId(id),
                Err(_) => {
                    tracing::warn!("Invalid block id {} in column ({}, {}), using air", raw, nbt.x_pos, nbt.z_pos);
                    BlockId::AIR
                }
            })
            .collect();

        let blocks: Vec<BlockId> = match &section.data {
            Some(data) if palette.len() > 1 => unpack_indices(data, palette.len())
                .iter()
                .map(|&idx| palette.get(idx as usize).copied().unwrap_or(BlockId::AIR))
                .collect(),
            _ => vec![palette[0]; SECTION_VOLUME],
        };
        if let Some(restored) = ChunkSection::from_blocks(&blocks) {
            chunk.insert_section(section.y, restored);
        }
    }

    let entities = nbt
        .entities
        .into_iter()
        .map(|e| StoredEntity {
            kind: e.id,
            pos: BlockPos::new(e.x, e.y, e.z),
        })
        .collect();

    StoredColumn { chunk, entities }
}

/// Write via a temporary file and rename so a crash never leaves a torn file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

// ── Provider ─────────────────────────────────────────────────────────────────

/// Stores a world in a plain directory. One instance may back several worlds
/// (one per dimension); they all share its `Settings`.
pub struct DirProvider {
    dir: PathBuf,
    settings: Arc<Settings>,
}

impl DirProvider {
    /// Open (or create) the world directory at `dir`. A missing `level.json`
    /// starts a new world named after the directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating world dir {}", dir.display()))?;

        let level_path = dir.join(LEVEL_FILE);
        let settings = if level_path.exists() {
            let bytes = fs::read(&level_path).with_context(|| format!("reading {}", level_path.display()))?;
            let level: LevelJson =
                serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", level_path.display()))?;
            tracing::info!("Loaded world '{}' at tick {}", level.name, level.current_tick);
            Settings::new(level.name, level.current_tick)
        } else {
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("World");
            tracing::info!("Creating new world '{}' in {}", name, dir.display());
            Settings::new(name, 0)
        };

        Ok(Self {
            dir,
            settings: Arc::new(settings),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn column_path(&self, pos: ChunkPos, dimension: Dimension) -> PathBuf {
        self.dir
            .join(dimension.name())
            .join("columns")
            .join(format!("c.{}.{}.nbt.gz", pos.x, pos.z))
    }
}

impl Provider for DirProvider {
    fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        let level = LevelJson {
            name: settings.name().to_string(),
            current_tick: settings.current_tick(),
            data_version: DATA_VERSION,
        };
        let bytes = serde_json::to_vec_pretty(&level).context("serializing level.json")?;
        write_atomic(&self.dir.join(LEVEL_FILE), &bytes)
    }

    fn load_column(&self, pos: ChunkPos, dimension: Dimension) -> Result<Option<StoredColumn>> {
        let path = self.column_path(pos, dimension);
        if !path.exists() {
            return Ok(None);
        }
        let compressed = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let mut bytes = Vec::new();
        GzDecoder::new(&compressed[..])
            .read_to_end(&mut bytes)
            .with_context(|| format!("decompressing {}", path.display()))?;
        let nbt: ColumnNbt = fastnbt::from_bytes(&bytes)
            .with_context(|| format!("deserializing column ({}, {})", pos.x, pos.z))?;

        if (nbt.x_pos, nbt.z_pos) != (pos.x, pos.z) {
            tracing::warn!(
                "Column file {} claims position ({}, {})",
                path.display(),
                nbt.x_pos,
                nbt.z_pos
            );
        }
        Ok(Some(nbt_to_column(nbt)))
    }

    fn store_column(
        &self,
        pos: ChunkPos,
        dimension: Dimension,
        chunk: &Chunk,
        entities: &[StoredEntity],
    ) -> Result<()> {
        let path = self.column_path(pos, dimension);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }

        let nbt = column_to_nbt(pos, chunk, entities);
        let bytes = fastnbt::to_bytes(&nbt).with_context(|| format!("serializing column ({}, {})", pos.x, pos.z))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        let compressed = encoder.finish()?;
        write_atomic(&path, &compressed)
    }

    fn close(&self) -> Result<()> {
        // Settings are written by the advancing world's saves, never here:
        // a read-only world must leave the directory untouched.
        tracing::info!("World directory {} closed", self.dir.display());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
