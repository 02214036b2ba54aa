//! 比特流读取游标.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 H.264/HEVC 头部语法解析的
//! 基础设施. 按大端位序读取 (MSB first).
//!
//! # 越界读取的退化行为
//!
//! 与常规读取器不同, [`BitCursor::read_bits`] 在游标越过缓冲区末尾时不
//! 返回错误, 而是把已累积的部分结果左移剩余未读位数后返回 (低位补零).
//! 调用方在缓冲区末尾附近取值时必须检查 [`BitCursor::at_eof`], 否则不应
//! 信任读到的值. 头部解析器正是在整段语法走完之后统一做这个检查.

/// 比特流读取游标
///
/// 借用一段字节缓冲区 (通常是去防竞争后的 RBSP), 每个 NAL 单元创建一个.
/// 只支持向前消费, 不提供回退或窥视.
///
/// # 示例
/// ```
/// use liuxi_core::bitreader::BitCursor;
///
/// let data = [0b1011_0001, 0b0101_0101];
/// let mut bc = BitCursor::new(&data);
/// assert_eq!(bc.read_bits(4), 0b1011);
/// assert_eq!(bc.read_bits(4), 0b0001);
/// assert_eq!(bc.read_bits(8), 0b0101_0101);
/// assert!(bc.at_eof());
/// ```
pub struct BitCursor<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节偏移
    offset_bytes: usize,
    /// 当前字节内的位偏移 (0-7, 0 表示最高位)
    offset_bits: u8,
}

impl<'a> BitCursor<'a> {
    /// 创建新的读取游标
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset_bytes: 0,
            offset_bits: 0,
        }
    }

    /// 是否已到达数据末尾
    pub fn at_eof(&self) -> bool {
        self.offset_bytes >= self.data.len()
    }

    /// 读取 1 个位
    ///
    /// 越界时返回 0 (见模块级说明).
    pub fn read_bit(&mut self) -> u32 {
        self.read_bits(1)
    }

    /// 读取 N 个位 (1 到 32 位), 返回值的低 N 位有效
    ///
    /// 读取途中越界时, 把已读部分左移剩余位数后返回.
    pub fn read_bits(&mut self, n: u32) -> u32 {
        debug_assert!((1..=32).contains(&n), "read_bits: n={n} 超出 1..=32");

        let mut ret: u32 = 0;
        let mut remaining = n;
        while remaining > 0 {
            if self.at_eof() {
                return ret.wrapping_shl(remaining);
            }
            let byte = self.data[self.offset_bytes];
            while self.offset_bits < 8 {
                ret = (ret << 1) | u32::from((byte >> (7 - self.offset_bits)) & 0x01);
                self.offset_bits += 1;
                remaining -= 1;
                if remaining == 0 {
                    if self.offset_bits == 8 {
                        self.offset_bytes += 1;
                        self.offset_bits = 0;
                    }
                    return ret;
                }
            }
            self.offset_bytes += 1;
            self.offset_bits = 0;
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_basic() {
        let data = [0b1011_0001, 0b0101_0101];
        let mut bc = BitCursor::new(&data);

        assert_eq!(bc.read_bits(1), 1);
        assert_eq!(bc.read_bits(1), 0);
        assert_eq!(bc.read_bits(2), 0b11);
        assert_eq!(bc.read_bits(4), 0b0001);
        assert_eq!(bc.read_bits(8), 0b0101_0101);
        assert!(bc.at_eof());
    }

    #[test]
    fn test_read_bits_cross_byte() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_bits(4), 0xF);
        assert_eq!(bc.read_bits(16), 0xF00F);
        assert_eq!(bc.read_bits(12), 0xF00);
        assert!(bc.at_eof());
    }

    #[test]
    fn test_read_bits_32() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_bits(32), 0xFF00FF00);
    }

    #[test]
    fn test_read_bits_composition() {
        // 位消费的结合律: 多次读取拼接 == 一次读取总宽度
        let data = [0xA5, 0x3C, 0x96, 0xE7];
        for split in 1..24u32 {
            let mut a = BitCursor::new(&data);
            let mut b = BitCursor::new(&data);
            let total = 24u32;
            let hi = a.read_bits(split);
            let lo = a.read_bits(total - split);
            let combined = (hi << (total - split)) | lo;
            assert_eq!(combined, b.read_bits(total), "split={split}");
        }
    }

    #[test]
    fn test_read_bits_past_end_zero_padded() {
        // 越界: 已读部分左移剩余位数, 低位补零
        let data = [0b1100_0000];
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_bits(12), 0b1100_0000 << 4);
        assert!(bc.at_eof());

        // 完全越界时读到 0
        assert_eq!(bc.read_bits(8), 0);
    }

    #[test]
    fn test_at_eof_mid_byte() {
        let data = [0xFF];
        let mut bc = BitCursor::new(&data);
        bc.read_bits(7);
        assert!(!bc.at_eof());
        bc.read_bits(1);
        assert!(bc.at_eof());
    }

    #[test]
    fn test_empty_buffer() {
        let mut bc = BitCursor::new(&[]);
        assert!(bc.at_eof());
        assert_eq!(bc.read_bits(16), 0);
    }
}
