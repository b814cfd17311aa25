//! Build orchestrator: source image in, committed tile database out.
//!
//! Every slice of every stack index is normalized, tiled and summarized, and
//! all records go into a single transaction. Any failure rolls the whole
//! build back and removes an output file this build created.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::BuildError;
use crate::processor::{is_valid_quality, ImageProcessor, TileFormat, DEFAULT_JPEG_QUALITY};
use crate::pyramid::{PyramidBuilder, Slice, DEFAULT_PSPEC_TILE_SIZE, DEFAULT_TILE_SIZE};
use crate::store::{TileStore, TilesetMetadata, DEFAULT_DESCRIPTION};

// =============================================================================
// Configuration
// =============================================================================

/// Parameters of one build. Immutable once the build starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Edge length of pyramid tiles
    pub tile_size: u32,

    /// Edge length of power spectrum blocks; must be a power of two
    pub pspec_tile_size: u32,

    pub tile_format: TileFormat,

    /// JPEG quality (1-100); ignored for PNG tiles
    pub jpeg_quality: u8,

    /// Metadata `description` value
    pub description: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            pspec_tile_size: DEFAULT_PSPEC_TILE_SIZE,
            tile_format: TileFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

impl BuildConfig {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_pspec_tile_size(mut self, pspec_tile_size: u32) -> Self {
        self.pspec_tile_size = pspec_tile_size;
        self
    }

    pub fn with_tile_format(mut self, tile_format: TileFormat) -> Self {
        self.tile_format = tile_format;
        self
    }

    pub fn with_jpeg_quality(mut self, jpeg_quality: u8) -> Self {
        self.jpeg_quality = jpeg_quality;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile size must be greater than 0".to_string());
        }

        if !self.pspec_tile_size.is_power_of_two() || self.pspec_tile_size < 4 {
            return Err(format!(
                "power spectrum size must be a power of two of at least 4, got {}",
                self.pspec_tile_size
            ));
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.jpeg_quality
            ));
        }

        Ok(())
    }
}

/// Counts of what a successful build wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Stack indices in the source
    pub indices: usize,

    /// 2D slices tiled (one per index, or one per Z plane of a volume)
    pub slices: usize,

    pub tiles: u64,

    /// Thumbnail and power spectrum records
    pub infos: u64,
}

// =============================================================================
// Build
// =============================================================================

/// Build a tile database at `output` from the image at `source`.
///
/// The source is opened before the output is touched, so an unreadable source
/// never leaves a file behind. An existing output is never removed, and
/// building into one that already holds tiles fails with `SchemaExists`.
pub fn build<P: ImageProcessor>(
    processor: &P,
    source: &Path,
    output: &Path,
    config: &BuildConfig,
) -> Result<BuildReport, BuildError> {
    config.validate().map_err(BuildError::InvalidConfig)?;

    let handle = processor.open_image(source)?;
    let output_existed = output.exists();

    let result = TileStore::create(output)
        .map_err(BuildError::from)
        .and_then(|mut store| {
            let result = write_tileset(processor, &handle, &mut store, output, config);
            if result.is_err() {
                if let Err(e) = store.abort() {
                    warn!(output = %output.display(), "rollback failed: {}", e);
                }
            }
            result
        });

    match result {
        Ok(report) => {
            info!(
                output = %output.display(),
                slices = report.slices,
                tiles = report.tiles,
                infos = report.infos,
                "build complete"
            );
            Ok(report)
        }
        Err(e) => {
            if !output_existed && output.exists() {
                if let Err(remove_err) = fs::remove_file(output) {
                    warn!(output = %output.display(), "could not remove partial output: {}", remove_err);
                }
            }
            Err(e)
        }
    }
}

fn write_tileset<P: ImageProcessor>(
    processor: &P,
    handle: &P::Handle,
    store: &mut TileStore,
    output: &Path,
    config: &BuildConfig,
) -> Result<BuildReport, BuildError> {
    store.create_schema()?;

    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| output.display().to_string());
    store.write_metadata(
        &TilesetMetadata::new(name, config.tile_format.name())
            .with_description(config.description.clone()),
    )?;

    let builder = PyramidBuilder::new(processor)
        .with_tile_size(config.tile_size)
        .with_pspec_tile_size(config.pspec_tile_size)
        .with_format(config.tile_format)
        .with_quality(config.jpeg_quality);

    let indices = processor.slice_count(handle);
    let mut report = BuildReport {
        indices,
        ..BuildReport::default()
    };

    for index in 0..indices {
        let stack_index = u32::try_from(index)
            .map_err(|_| BuildError::InvalidConfig(format!("stack index {} too large", index)))?;
        let header = processor.read_header(handle, index)?;
        info!(
            index,
            width = header.width,
            height = header.height,
            depth = header.depth,
            "building stack index"
        );

        for z in 0..header.depth.max(1) {
            let plane = header.is_volume().then_some(z);
            let mut pixels = processor.read_region(handle, index, plane, None)?;
            processor.normalize(&mut pixels);
            let slice = Slice::new(stack_index, z, pixels);

            write_slice(&builder, &slice, store, &mut report)?;
            report.slices += 1;
        }
    }

    store.commit()?;
    Ok(report)
}

fn write_slice<P: ImageProcessor>(
    builder: &PyramidBuilder<'_, P>,
    slice: &Slice,
    store: &mut TileStore,
    report: &mut BuildReport,
) -> Result<(), BuildError> {
    let mut tiles = 0u64;
    for record in builder.build_pyramid(slice) {
        store.insert_tile(&record?)?;
        tiles += 1;
    }

    let mut infos = builder.power_spectrum(slice)?;
    infos.push(builder.thumbnail(slice)?);
    for record in &infos {
        store.insert_info(record)?;
    }

    debug!(
        index = slice.index,
        z = slice.z,
        tiles,
        infos = infos.len(),
        "slice written"
    );
    report.tiles += tiles;
    report.infos += infos.len() as u64;
    Ok(())
}
