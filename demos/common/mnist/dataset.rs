use anyhow::{Context, bail};
use burn_common::network::downloader::download_file_as_bytes;
use burn_dataset::{
    Dataset, InMemDataset,
    transform::{Mapper, MapperDataset},
};
use cnn_compare::data::ImageItem;
use flate2::read::GzDecoder;
use num_traits::AsPrimitive;
use std::fs::{File, create_dir_all};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

#[derive(Debug, Clone)]
struct MnistItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

struct BytesToImage;

impl Mapper<MnistItemRaw, ImageItem> for BytesToImage {
    fn map(&self, item: &MnistItemRaw) -> ImageItem {
        debug_assert_eq!(item.image_bytes.len(), WIDTH * HEIGHT);
        let image = item
            .image_bytes
            .iter()
            .map(|brightness| -> f32 { (*brightness).as_() })
            .collect();
        ImageItem::new(image, item.label as usize)
    }
}

type MappedDataset = MapperDataset<InMemDataset<MnistItemRaw>, BytesToImage, MnistItemRaw>;

/// The MNIST dataset consists of 70,000 28x28 black-and-white images in 10 classes (one for each
/// digit). There are 60,000 training images and 10,000 test images.
///
/// The data is downloaded from the [CVDF mirror](https://github.com/cvdfoundation/mnist) into
/// `~/.cache/burn-dataset/mnist`.
pub struct MnistDataset {
    dataset: MappedDataset,
}

impl Dataset<ImageItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

#[derive(Debug, Clone, Copy)]
enum Split {
    Train,
    Test,
}

impl Split {
    fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }

    fn files(&self) -> (&'static str, &'static str) {
        match self {
            Split::Train => (TRAIN_IMAGES, TRAIN_LABELS),
            Split::Test => (TEST_IMAGES, TEST_LABELS),
        }
    }
}

impl MnistDataset {
    pub fn train() -> anyhow::Result<Self> {
        Self::new(Split::Train)
    }

    pub fn test() -> anyhow::Result<Self> {
        Self::new(Split::Test)
    }

    fn new(split: Split) -> anyhow::Result<Self> {
        let root = Self::download(split)?;
        let (images_file, labels_file) = split.files();

        // train images (u8): 28 * 28 * 60000 = 47.04MB, so everything stays in memory
        let images = Self::read_images(&root.join(images_file))?;
        let labels = Self::read_labels(&root.join(labels_file))?;
        if images.len() != labels.len() {
            bail!(
                "{} split has {} images but {} labels",
                split.dir_name(),
                images.len(),
                labels.len()
            );
        }
        tracing::info!("loaded {} MNIST {} images", images.len(), split.dir_name());

        let items: Vec<_> = images
            .into_iter()
            .zip(labels)
            .map(|(image_bytes, label)| MnistItemRaw { image_bytes, label })
            .collect();

        let dataset = MapperDataset::new(InMemDataset::new(items), BytesToImage);
        Ok(Self { dataset })
    }

    fn download(split: Split) -> anyhow::Result<PathBuf> {
        let cache_dir = dirs::home_dir()
            .context("could not get the home directory")?
            .join(".cache")
            .join("burn-dataset");
        let split_dir = cache_dir.join("mnist").join(split.dir_name());
        create_dir_all(&split_dir).with_context(|| format!("failed to create {split_dir:?}"))?;

        let (images, labels) = split.files();
        Self::download_file(images, &split_dir)?;
        Self::download_file(labels, &split_dir)?;
        Ok(split_dir)
    }

    /// Downloads and decompresses `name` into `dest_dir`, unless it's already there.
    fn download_file(name: &str, dest_dir: &Path) -> anyhow::Result<PathBuf> {
        let file_name = dest_dir.join(name);
        if !file_name.exists() {
            let bytes = download_file_as_bytes(&format!("{URL}{name}.gz"), name);
            let mut output_file = File::create(&file_name)
                .with_context(|| format!("failed to create {file_name:?}"))?;
            let mut gz_buffer = GzDecoder::new(&bytes[..]);
            std::io::copy(&mut gz_buffer, &mut output_file)
                .with_context(|| format!("failed to decompress {name}"))?;
        }
        Ok(file_name)
    }

    /// Images as vectors of bytes, after the 16-byte IDX header.
    fn read_images(path: &Path) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut f = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
        let size = read_header_count(&mut f).with_context(|| format!("bad header in {path:?}"))?;

        let mut buf_images: Vec<u8> = vec![0u8; WIDTH * HEIGHT * size];
        f.seek(SeekFrom::Start(16))?;
        f.read_exact(&mut buf_images)
            .with_context(|| format!("truncated image file {path:?}"))?;

        Ok(buf_images
            .chunks(WIDTH * HEIGHT)
            .map(|chunk| chunk.to_vec())
            .collect())
    }

    /// Labels, after the 8-byte IDX header.
    fn read_labels(path: &Path) -> anyhow::Result<Vec<u8>> {
        let mut f = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
        let size = read_header_count(&mut f).with_context(|| format!("bad header in {path:?}"))?;

        let mut buf_labels: Vec<u8> = vec![0u8; size];
        f.seek(SeekFrom::Start(8))?;
        f.read_exact(&mut buf_labels)
            .with_context(|| format!("truncated label file {path:?}"))?;
        Ok(buf_labels)
    }
}

/// Item count of an IDX file, a big-endian u32 after the magic number.
fn read_header_count(f: &mut File) -> std::io::Result<usize> {
    let mut buf = [0u8; 4];
    f.seek(SeekFrom::Start(4))?;
    f.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf) as usize)
}
