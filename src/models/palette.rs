use image::{DynamicImage, GenericImageView};

/// 颜色统计时的采样尺寸，超过这个尺寸的图片会先缩小
const SAMPLE_SIZE: u32 = 128;

/// 调色板中的颜色名称
pub const COLORS: [&str; 11] =
    ["black", "white", "gray", "red", "orange", "yellow", "green", "cyan", "blue", "purple", "pink"];

/// 同一种颜色覆盖的区域
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRegion {
    pub name: &'static str,
    /// 占全图像素的比例，范围 (0, 1]
    pub coverage: f32,
    /// `[x1, y1, x2, y2]`，原图坐标
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct Palette {
    pub width: u32,
    pub height: u32,
    /// 按覆盖率从高到低排列
    pub regions: Vec<ColorRegion>,
}

impl Palette {
    pub fn orientation(&self) -> &'static str {
        orientation(self.width, self.height)
    }
}

#[derive(Clone, Copy)]
struct Extent {
    count: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

/// 统计图片中各颜色的覆盖率和范围
///
/// 三个内置模型各自调用一次，互不共享结果；超过 `SAMPLE_SIZE` 的图片只扫描缩略图，
/// 同一张图片多次调用的结果完全相同。
pub fn analyze(image: &DynamicImage) -> Palette {
    let (width, height) = image.dimensions();
    let sample = if width > SAMPLE_SIZE || height > SAMPLE_SIZE {
        image.thumbnail(SAMPLE_SIZE, SAMPLE_SIZE).to_rgb8()
    } else {
        image.to_rgb8()
    };
    let scale_x = width as f32 / sample.width().max(1) as f32;
    let scale_y = height as f32 / sample.height().max(1) as f32;

    let mut extents: [Option<Extent>; COLORS.len()] = [None; COLORS.len()];
    for (x, y, pixel) in sample.enumerate_pixels() {
        let slot = &mut extents[classify(pixel.0)];
        match slot {
            Some(e) => {
                e.count += 1;
                e.min_x = e.min_x.min(x);
                e.min_y = e.min_y.min(y);
                e.max_x = e.max_x.max(x);
                e.max_y = e.max_y.max(y);
            }
            None => *slot = Some(Extent { count: 1, min_x: x, min_y: y, max_x: x, max_y: y }),
        }
    }

    let total = (sample.width() * sample.height()).max(1) as f32;
    let mut regions = extents
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.map(|e| (i, e)))
        .map(|(i, e)| ColorRegion {
            name: COLORS[i],
            coverage: e.count as f32 / total,
            bbox: [
                e.min_x as f32 * scale_x,
                e.min_y as f32 * scale_y,
                (e.max_x + 1) as f32 * scale_x,
                (e.max_y + 1) as f32 * scale_y,
            ],
        })
        .collect::<Vec<_>>();
    // 稳定排序，覆盖率相同时保持调色板顺序
    regions.sort_by(|a, b| b.coverage.total_cmp(&a.coverage));

    Palette { width, height, regions }
}

pub fn orientation(width: u32, height: u32) -> &'static str {
    let (w, h) = (width as f32, height as f32);
    if w > h * 1.2 {
        "wide"
    } else if h > w * 1.2 {
        "tall"
    } else {
        "square"
    }
}

/// 将像素归类到调色板中，返回颜色下标
fn classify([r, g, b]: [u8; 3]) -> usize {
    let (r, g, b) = (r as f32 / 255., g as f32 / 255., b as f32 / 255.);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let saturation = if max == 0. { 0. } else { delta / max };

    if max < 0.2 {
        return 0;
    }
    if saturation < 0.2 {
        return if max > 0.8 { 1 } else { 2 };
    }

    let hue = if max == r {
        60. * (((g - b) / delta).rem_euclid(6.))
    } else if max == g {
        60. * ((b - r) / delta + 2.)
    } else {
        60. * ((r - g) / delta + 4.)
    };

    match hue {
        h if !(15. ..345.).contains(&h) => 3,
        h if h < 45. => 4,
        h if h < 70. => 5,
        h if h < 170. => 6,
        h if h < 200. => 7,
        h if h < 260. => 8,
        h if h < 300. => 9,
        _ => 10,
    }
}
