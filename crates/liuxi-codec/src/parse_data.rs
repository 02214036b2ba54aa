//! 解析状态与流参数聚合.
//!
//! [`FrameParseData`] 在访问单元扫描过程中累积 SPS/PPS/切片头状态,
//! 找到首个访问单元后由调用方通过 [`FrameParseData::stream_parameters`]
//! 取得配置解码所需的流参数.

use liuxi_core::Rational;

/// 编解码器标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    Hevc,
}

/// H.264 序列参数集 (SPS) 中与预解析相关的字段
#[derive(Debug, Clone, Copy, Default)]
pub struct H264SeqParamSet {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,
    pub chroma_format_idc: u8,
    pub log2_max_frame_num_minus4: u8,
    pub pic_order_cnt_type: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub delta_pic_order_always_zero_flag: bool,
    pub frame_mbs_only_flag: bool,
    pub frame_cropping_flag: bool,
}

/// H.264 图像参数集 (PPS) 中与预解析相关的字段
#[derive(Debug, Clone, Copy, Default)]
pub struct H264PicParamSet {
    pub seq_parameter_set_id: u8,
    pub pic_order_present_flag: bool,
}

/// H.264 切片头中参与图像边界判定的字段
#[derive(Debug, Clone, Copy, Default)]
pub struct H264SliceHeader {
    pub delta_pic_order_cnt_bottom: i64,
    pub delta_pic_order_cnt: [i64; 2],
    pub frame_num: u16,
    pub idr_pic_id: u16,
    pub pic_order_cnt_lsb: u16,
    pub pic_parameter_set_id: u8,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
}

/// HEVC 短期参考图像集 (short-term RPS)
#[derive(Debug, Clone, Copy)]
pub struct ShortTermRps {
    pub num_negative_pics: u32,
    pub num_delta_pocs: u32,
    pub delta_poc: [i32; 32],
    pub used: [bool; 32],
}

impl Default for ShortTermRps {
    fn default() -> Self {
        Self {
            num_negative_pics: 0,
            num_delta_pocs: 0,
            delta_poc: [0; 32],
            used: [false; 32],
        }
    }
}

/// HEVC 序列参数集 (SPS) 中与预解析相关的字段
#[derive(Debug, Clone, Default)]
pub struct HevcSeqParamSet {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub st_rps: Vec<ShortTermRps>,
}

/// 解析结果汇总: 分辨率、帧率、位深与活动参数集
///
/// 调用方在首个访问单元边界确定后读取.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParameters {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// 亮度位深 (8 或 10)
    pub luma_depth: u32,
    pub profile_idc: u32,
    pub level_idc: u32,
}

/// 访问单元扫描的累积解析状态
///
/// 参数集按 id 存入定长数组, 同 id 的后来者整体覆盖前者;
/// 切片头保留最近一次的副本用于图像边界判定.
pub struct FrameParseData {
    /// 码流编解码器
    pub codec: CodecId,
    /// 由最近一次 SPS 解析得出的显示宽度
    pub width: u32,
    /// 由最近一次 SPS 解析得出的显示高度
    pub height: u32,
    /// 由 VUI timing 信息得出的帧率 (约分后), 未出现时为 None
    pub fps: Option<Rational>,
    /// 亮度位深, 默认 8
    pub luma_depth: u32,
    /// 最近一个被切片引用的 PPS id
    pub current_h264_pps: u8,
    /// 最近一次成功解析的 HEVC SPS id
    pub latest_hevc_sps: u8,
    /// H.264 SPS 表, 按 seq_parameter_set_id 索引
    pub h264_sps: [Option<H264SeqParamSet>; 32],
    /// H.264 PPS 表, 按 pic_parameter_set_id 索引
    pub h264_pps: [Option<H264PicParamSet>; 256],
    /// HEVC SPS 表, 按 sps_seq_parameter_set_id 索引
    pub hevc_sps: [Option<HevcSeqParamSet>; 32],
    /// 最近一个已接受切片的头部
    pub last_h264_slice_header: H264SliceHeader,
}

impl FrameParseData {
    /// 创建指定编解码器的初始解析状态
    ///
    /// 上一切片头的 POC 增量种子为 -1, 保证首个携带这些字段的
    /// 切片必然判定为新图像.
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            width: 0,
            height: 0,
            fps: None,
            luma_depth: 8,
            current_h264_pps: 0,
            latest_hevc_sps: 0,
            h264_sps: [None; 32],
            h264_pps: [None; 256],
            hevc_sps: std::array::from_fn(|_| None),
            last_h264_slice_header: H264SliceHeader {
                delta_pic_order_cnt_bottom: -1,
                delta_pic_order_cnt: [-1, -1],
                ..H264SliceHeader::default()
            },
        }
    }

    /// 解析当前活动 SPS 得出流参数
    ///
    /// H.264 沿 当前 PPS → 所引用 SPS 链取 profile/level;
    /// HEVC 直接取最近的 SPS. 对应参数集缺失时返回 None.
    pub fn stream_parameters(&self) -> Option<StreamParameters> {
        let (profile_idc, level_idc) = match self.codec {
            CodecId::H264 => {
                let pps = self.h264_pps[usize::from(self.current_h264_pps)].as_ref()?;
                let sps = self.h264_sps[usize::from(pps.seq_parameter_set_id)].as_ref()?;
                (u32::from(sps.profile_idc), u32::from(sps.level_idc))
            }
            CodecId::Hevc => {
                let sps = self.hevc_sps[usize::from(self.latest_hevc_sps)].as_ref()?;
                (u32::from(sps.profile_idc), u32::from(sps.level_idc))
            }
        };
        let (fps_num, fps_den) = match self.fps {
            Some(r) => (r.num as u32, r.den as u32),
            None => (0, 0),
        };
        Some(StreamParameters {
            width: self.width,
            height: self.height,
            fps_num,
            fps_den,
            luma_depth: self.luma_depth,
            profile_idc,
            level_idc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_seeds_slice_header() {
        let pd = FrameParseData::new(CodecId::H264);
        assert_eq!(pd.last_h264_slice_header.delta_pic_order_cnt_bottom, -1);
        assert_eq!(pd.last_h264_slice_header.delta_pic_order_cnt, [-1, -1]);
        assert_eq!(pd.last_h264_slice_header.frame_num, 0);
        assert_eq!(pd.luma_depth, 8);
    }

    #[test]
    fn test_stream_parameters_requires_active_sets() {
        let mut pd = FrameParseData::new(CodecId::H264);
        assert!(pd.stream_parameters().is_none());

        pd.h264_pps[0] = Some(H264PicParamSet {
            seq_parameter_set_id: 3,
            pic_order_present_flag: false,
        });
        // PPS 引用的 SPS 尚未出现
        assert!(pd.stream_parameters().is_none());

        pd.h264_sps[3] = Some(H264SeqParamSet {
            profile_idc: 100,
            level_idc: 41,
            ..H264SeqParamSet::default()
        });
        pd.width = 1920;
        pd.height = 1080;
        let params = pd.stream_parameters().unwrap();
        assert_eq!(params.profile_idc, 100);
        assert_eq!(params.level_idc, 41);
        assert_eq!((params.width, params.height), (1920, 1080));
        assert_eq!((params.fps_num, params.fps_den), (0, 0));
    }

    #[test]
    fn test_stream_parameters_hevc() {
        let mut pd = FrameParseData::new(CodecId::Hevc);
        pd.hevc_sps[0] = Some(HevcSeqParamSet {
            profile_idc: 1,
            level_idc: 120,
            st_rps: Vec::new(),
        });
        pd.width = 3840;
        pd.height = 2160;
        pd.luma_depth = 10;
        pd.fps = Some(Rational::new(60000, 1001));
        let params = pd.stream_parameters().unwrap();
        assert_eq!(params.profile_idc, 1);
        assert_eq!(params.luma_depth, 10);
        assert_eq!((params.fps_num, params.fps_den), (60000, 1001));
    }
}
