//! # 解码与转码模块
//!
//! ## 设计思路
//!
//! 输入是格式未知的原始字节，输出是固定边长（默认 16×16）的 PNG。
//! 只做两次解码尝试：先按多分辨率 ICO 容器，失败再按通用位图，第二次失败即为该单元的终态错误。
//!
//! ## 实现思路
//!
//! 1. 解析 ICO 目录，挑选最接近目标尺寸的条目，重建为单条目 ICO 后解码
//! 2. 回退：读取头信息检查像素上限，再用 `image` 通用解码
//! 3. 拉伸绘制到目标画布（不保持宽高比），`fast_image_resize` 失败时回退 `image` 缩放
//! 4. 编码为 PNG

use fast_image_resize as fr;
use image::codecs::ico::IcoDecoder;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageDecoder, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::cmp::Reverse;
use std::io::Cursor;

use super::{DownloadError, FaviconConfig, ResampleQuality};

const ICO_HEADER_LEN: usize = 6;
const ICO_ENTRY_LEN: usize = 16;
const ICO_TYPE_ICON: u16 = 1;

/// ICO 目录条目。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IconDirEntry {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bit_count: u16,
    /// 条目在原始字节中的起始位置（含 16 字节目录项）。
    pub(crate) entry_start: usize,
    pub(crate) data_offset: usize,
    pub(crate) data_len: usize,
}

/// 图标转码器。
#[derive(Debug, Clone)]
pub struct IconTranscoder {
    size: u32,
    quality: ResampleQuality,
    max_decoded_pixels: u64,
}

impl IconTranscoder {
    pub fn new(config: &FaviconConfig) -> Self {
        Self {
            size: config.icon_size,
            quality: config.resample_quality,
            max_decoded_pixels: config.max_decoded_pixels,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// 完整转码：解码 → 绘制到画布 → PNG。
    pub fn transcode(&self, raw: &[u8]) -> Result<Vec<u8>, DownloadError> {
        let decoded = self.decode(raw)?;
        let (source_width, source_height) = decoded.dimensions();
        let canvas = self.render(decoded)?;
        let png = Self::encode_png(canvas)?;

        log::debug!(
            "🧩 图标转码完成：{}x{} -> {}x{}（{} bytes）",
            source_width,
            source_height,
            self.size,
            self.size,
            png.len()
        );
        Ok(png)
    }

    fn decode(&self, raw: &[u8]) -> Result<DynamicImage, DownloadError> {
        if raw.is_empty() {
            return Err(DownloadError::TranscodeFailed("内容为空".to_string()));
        }

        match self.decode_icon_container(raw) {
            Ok(image) => Ok(image),
            Err(icon_err) => {
                log::debug!("ICO 解码失败，回退通用解码：{}", icon_err);
                self.decode_generic(raw).map_err(|generic_err| {
                    let sniffed = infer::get(raw).map(|k| k.mime_type()).unwrap_or("unknown");
                    DownloadError::TranscodeFailed(format!(
                        "无法识别的图片（{}）：{}",
                        sniffed, generic_err
                    ))
                })
            }
        }
    }

    /// 按 ICO 容器解码，选取最接近目标尺寸的条目。
    fn decode_icon_container(&self, raw: &[u8]) -> Result<DynamicImage, String> {
        let entries = parse_icon_directory(raw)?;
        let entry = select_entry(&entries, self.size).ok_or("ICO 目录为空")?;
        let single = rebuild_single_entry_icon(raw, entry);

        let decoder = IcoDecoder::new(Cursor::new(single)).map_err(|e| e.to_string())?;
        let (width, height) = decoder.dimensions();
        self.validate_pixel_limits(width, height)?;

        DynamicImage::from_decoder(decoder).map_err(|e| e.to_string())
    }

    fn decode_generic(&self, raw: &[u8]) -> Result<DynamicImage, String> {
        let (width, height) = ImageReader::new(Cursor::new(raw))
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string())?;
        self.validate_pixel_limits(width, height)?;

        image::load_from_memory(raw).map_err(|e| e.to_string())
    }

    fn validate_pixel_limits(&self, width: u32, height: u32) -> Result<(), String> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 {
            return Err("图片尺寸为 0".to_string());
        }
        if pixels > self.max_decoded_pixels {
            return Err(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, self.max_decoded_pixels
            ));
        }
        Ok(())
    }

    /// 拉伸绘制到 `size × size` 画布。
    fn render(&self, image: DynamicImage) -> Result<RgbaImage, DownloadError> {
        match self.resize_with_fast_image_resize(&image) {
            Ok(canvas) => Ok(canvas),
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::resize：{}", err);
                Ok(image::imageops::resize(
                    &image.to_rgba8(),
                    self.size,
                    self.size,
                    self.quality.image_filter(),
                ))
            }
        }
    }

    fn resize_with_fast_image_resize(&self, image: &DynamicImage) -> Result<RgbaImage, String> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image =
            fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
                .map_err(|e| format!("构建源图像缓冲失败：{}", e))?;
        let mut dst_image = fr::images::Image::new(self.size, self.size, fr::PixelType::U8x4);

        let options = fr::ResizeOptions::new().resize_alg(self.quality.resize_alg());
        fr::Resizer::new()
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| format!("fast_image_resize 执行失败：{}", e))?;

        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(self.size, self.size, dst_image.into_vec())
            .ok_or_else(|| "fast_image_resize 输出缓冲长度异常".to_string())
    }

    fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>, DownloadError> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| DownloadError::TranscodeFailed(format!("PNG 编码失败：{}", e)))?;
        Ok(cursor.into_inner())
    }
}

fn read_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

fn read_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

/// 解析 ICO 头与目录；任何越界或字段异常都视为“不是 ICO”。
pub(crate) fn parse_icon_directory(raw: &[u8]) -> Result<Vec<IconDirEntry>, String> {
    if raw.len() < ICO_HEADER_LEN {
        return Err("长度不足 ICO 头".to_string());
    }
    if read_u16(raw, 0) != 0 || read_u16(raw, 2) != ICO_TYPE_ICON {
        return Err("不是 ICO 容器".to_string());
    }

    let count = read_u16(raw, 4) as usize;
    let directory_end = ICO_HEADER_LEN + count * ICO_ENTRY_LEN;
    if count == 0 || raw.len() < directory_end {
        return Err(format!("ICO 目录不完整（{} 个条目）", count));
    }

    (0..count)
        .map(|i| {
            let at = ICO_HEADER_LEN + i * ICO_ENTRY_LEN;
            let side = |b: u8| if b == 0 { 256 } else { u32::from(b) };
            let data_len = read_u32(raw, at + 8) as usize;
            let data_offset = read_u32(raw, at + 12) as usize;

            let in_bounds = data_offset >= directory_end
                && data_offset
                    .checked_add(data_len)
                    .is_some_and(|end| end <= raw.len());
            if data_len == 0 || !in_bounds {
                return Err(format!("ICO 条目 {} 数据越界", i));
            }

            Ok(IconDirEntry {
                width: side(raw[at]),
                height: side(raw[at + 1]),
                bit_count: read_u16(raw, at + 6),
                entry_start: at,
                data_offset,
                data_len,
            })
        })
        .collect()
}

/// 选择最接近目标尺寸的条目：
/// 完全匹配优先，其次最小的更大条目，最后最大的更小条目；同尺寸取色深更高者。
pub(crate) fn select_entry(entries: &[IconDirEntry], target: u32) -> Option<&IconDirEntry> {
    entries.iter().min_by_key(|entry| {
        let side = entry.width.max(entry.height);
        let class = match side.cmp(&target) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => 2,
        };
        (class, side.abs_diff(target), Reverse(entry.bit_count))
    })
}

/// 以选中条目重建只含一个图像的 ICO。
fn rebuild_single_entry_icon(raw: &[u8], entry: &IconDirEntry) -> Vec<u8> {
    let payload = &raw[entry.data_offset..entry.data_offset + entry.data_len];
    let new_offset = (ICO_HEADER_LEN + ICO_ENTRY_LEN) as u32;

    let mut out = Vec::with_capacity(ICO_HEADER_LEN + ICO_ENTRY_LEN + payload.len());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&ICO_TYPE_ICON.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&raw[entry.entry_start..entry.entry_start + 12]);
    out.extend_from_slice(&new_offset.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::codecs::ico::{IcoEncoder, IcoFrame};
    use image::{DynamicImage, ExtendedColorType, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    pub(crate) fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba(color)))
    }

    pub(crate) fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, format).expect("failed to encode test image");
        cursor.into_inner()
    }

    pub(crate) fn ico_bytes(width: u32, height: u32) -> Vec<u8> {
        encode(&solid(width, height, [200, 40, 40, 255]), ImageFormat::Ico)
    }

    /// 多分辨率 ICO：每帧一个纯色。
    pub(crate) fn multi_ico(frames: &[(u32, [u8; 4])]) -> Vec<u8> {
        let buffers: Vec<(u32, Vec<u8>)> = frames
            .iter()
            .map(|(side, color)| (*side, solid(*side, *side, *color).to_rgba8().into_raw()))
            .collect();
        let ico_frames: Vec<IcoFrame<'_>> = buffers
            .iter()
            .map(|(side, raw)| {
                IcoFrame::as_png(raw, *side, *side, ExtendedColorType::Rgba8).expect("ico frame")
            })
            .collect();

        let mut out = Vec::new();
        IcoEncoder::new(&mut out)
            .encode_images(&ico_frames)
            .expect("encode multi ico");
        out
    }
}
