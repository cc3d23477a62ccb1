//! Raw particle snapshots
//!
//! A snapshot is a flat array of fixed-size [`ParticleRecord`]s with no
//! header, read until EOF. Records use the native in-memory layout:
//!
//! | offset | size | field                |
//! |-------:|-----:|----------------------|
//! | 0      | 12   | position `[f32; 3]`  |
//! | 12     | 4    | padding (zero)       |
//! | 16     | 24   | velocity `[f64; 3]`  |
//! | 40     | 8    | mass `f64`           |
//! | 48     | 24   | force `[f64; 3]`     |
//! | 72     | 16   | color `[f32; 4]`     |

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use log::{error, info};

use crate::simulation::particle::{center_of_mass, NVec3, PVec3, Particle};

pub const RECORD_SIZE: usize = std::mem::size_of::<ParticleRecord>();

/// On-disk particle layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    pub position: [f32; 3],
    pub _padding: u32,
    pub velocity: [f64; 3],
    pub mass: f64,
    pub force: [f64; 3],
    pub color: [f32; 4],
}

impl From<&Particle> for ParticleRecord {
    fn from(p: &Particle) -> Self {
        Self {
            position: p.position.into(),
            _padding: 0,
            velocity: p.velocity.into(),
            mass: p.mass,
            force: p.force.into(),
            color: p.color,
        }
    }
}

impl From<&ParticleRecord> for Particle {
    fn from(r: &ParticleRecord) -> Self {
        Self {
            position: PVec3::from(r.position),
            velocity: NVec3::from(r.velocity),
            force: NVec3::from(r.force),
            mass: r.mass,
            color: r.color,
        }
    }
}

/// Write every particle as one record.
pub fn write_snapshot<W: Write>(mut writer: W, particles: &[Particle]) -> Result<()> {
    let records: Vec<ParticleRecord> = particles.iter().map(ParticleRecord::from).collect();
    writer
        .write_all(bytemuck::cast_slice(&records))
        .context("failed to write snapshot records")?;
    writer.flush().context("failed to flush snapshot")?;
    Ok(())
}

/// Read records until EOF. Positions are returned exactly as stored.
pub fn read_snapshot<R: Read>(mut reader: R) -> Result<Vec<Particle>> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .context("failed to read snapshot")?;

    if bytes.len() % RECORD_SIZE != 0 {
        bail!(
            "truncated snapshot: {} bytes is not a whole number of {RECORD_SIZE}-byte records",
            bytes.len()
        );
    }

    let records: Vec<ParticleRecord> = bytemuck::pod_collect_to_vec::<u8, ParticleRecord>(&bytes);
    Ok(records.iter().map(Particle::from).collect())
}

/// Write `particles` to `path`, creating parent directories.
pub fn save_snapshot(path: &Path, particles: &[Particle]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_snapshot(BufWriter::new(file), particles)?;
    info!("wrote {} particles to {}", particles.len(), path.display());
    Ok(())
}

/// Write a `snapshot_<unix-millis>.bin` file into `dir` and return its path.
/// An existing file is never overwritten; a `_<n>` suffix is added instead.
pub fn save_timestamped(dir: &Path, particles: &[Particle]) -> Result<PathBuf> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    for attempt in 0u32.. {
        let name = match attempt {
            0 => format!("snapshot_{millis}.bin"),
            n => format!("snapshot_{millis}_{n}.bin"),
        };
        let path = dir.join(name);
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to create {}", path.display()))
            }
        };
        write_snapshot(BufWriter::new(file), particles)?;
        info!("wrote {} particles to {}", particles.len(), path.display());
        return Ok(path);
    }
    bail!("no free snapshot name in {}", dir.display())
}

/// Read `path` and re-center positions on the mass-weighted centroid.
pub fn load_snapshot(path: &Path) -> Result<Vec<Particle>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut particles = read_snapshot(BufReader::new(file))
        .with_context(|| format!("failed to load {}", path.display()))?;

    let shift = center_of_mass(&particles).cast::<f32>();
    for p in particles.iter_mut() {
        p.position -= shift;
    }
    Ok(particles)
}

/// Replace `particles` with the snapshot at `path`. On failure the error is
/// logged and `particles` is left as it was.
pub fn load_snapshot_into(path: &Path, particles: &mut Vec<Particle>) -> Result<()> {
    match load_snapshot(path) {
        Ok(loaded) => {
            info!("loaded {} particles from {}", loaded.len(), path.display());
            *particles = loaded;
            Ok(())
        }
        Err(err) => {
            error!("{err:#}");
            Err(err)
        }
    }
}
