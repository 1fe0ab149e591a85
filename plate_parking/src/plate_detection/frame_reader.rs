use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use opencv::imgcodecs::{imread, IMREAD_COLOR};
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use tracing::{debug, info};

use crate::error::StationError;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Offline frame source: image files named directly, or every image inside
/// the given directories (not recursive, sorted by file name).
pub struct ImageFolderReader {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageFolderReader {
    pub fn new<P: AsRef<Path>>(inputs: &[P]) -> io::Result<Self> {
        let mut paths = Vec::new();
        for input in inputs {
            let input = input.as_ref();
            if input.is_dir() {
                let mut found: Vec<PathBuf> = fs::read_dir(input)?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.is_file() && is_image(path))
                    .collect();
                found.sort();
                debug!("{} images in {}", found.len(), input.display());
                paths.extend(found);
            } else {
                paths.push(input.to_path_buf());
            }
        }
        info!("Reading {} frames", paths.len());
        Ok(Self {
            paths: paths.into_iter(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn read_frame(path: &Path) -> Result<Mat, StationError> {
    let name = path
        .to_str()
        .ok_or_else(|| StationError::InvalidImage(format!("{} is not UTF-8", path.display())))?;
    let image = imread(name, IMREAD_COLOR)?;
    if image.empty() {
        return Err(StationError::InvalidImage(format!(
            "could not read an image from {}",
            path.display()
        )));
    }
    Ok(image)
}

impl Iterator for ImageFolderReader {
    type Item = (PathBuf, Result<Mat, StationError>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let frame = read_frame(&path);
        Some((path, frame))
    }
}
