use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::analysis::{Detection, StageErrors};

/// 尚未分配 ID 的图片记录
#[derive(Debug, Clone)]
pub struct NewImage {
    pub raw_bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    /// 图片内容的 blake3 哈希
    pub hash: String,
    pub detections: Vec<Detection>,
    pub caption: String,
    pub embedding: Option<Vec<f32>>,
    pub stage_errors: StageErrors,
}

/// 已入库的图片，创建后不再修改
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub id: Uuid,
    pub raw_bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub hash: String,
    pub detections: Vec<Detection>,
    pub caption: String,
    pub embedding: Option<Vec<f32>>,
    pub stage_errors: StageErrors,
}

impl StoredImage {
    fn new(id: Uuid, image: NewImage) -> Self {
        let NewImage {
            raw_bytes,
            mime_type,
            width,
            height,
            hash,
            detections,
            caption,
            embedding,
            stage_errors,
        } = image;
        Self {
            id,
            raw_bytes,
            mime_type,
            width,
            height,
            hash,
            detections,
            caption,
            embedding,
            stage_errors,
        }
    }
}

/// 只追加的图片表，保留插入顺序
#[derive(Default)]
pub struct ImageRegistry {
    images: Vec<Arc<StoredImage>>,
    positions: HashMap<Uuid, usize>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加图片并生成一个新的 ID
    pub fn append(&mut self, image: NewImage) -> Uuid {
        let id = loop {
            let id = Uuid::new_v4();
            if !self.positions.contains_key(&id) {
                break id;
            }
        };
        self.positions.insert(id, self.images.len());
        self.images.push(Arc::new(StoredImage::new(id, image)));
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<StoredImage>> {
        self.positions.get(id).map(|&i| self.images[i].clone())
    }

    /// 按插入顺序遍历
    pub fn list_ordered(&self) -> impl ExactSizeIterator<Item = &Arc<StoredImage>> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
