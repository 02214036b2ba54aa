//! Annex B 字节流扫描.
//!
//! H.264 与 HEVC 的 Annex B 格式使用起始码 (start code) `00 00 01`
//! 分隔 NAL 单元. 本模块提供:
//! - [`StreamScanner`]: 带内部缓冲区的增量扫描器, 按需从输入源补充
//!   数据并定位下一个起始码;
//! - [`to_rbsp`]: 去除防竞争字节 (emulation prevention byte) `0x03`,
//!   将转义后的载荷还原为 RBSP.

use std::io::Read;

use liuxi_core::{LiuxiError, LiuxiResult};

/// 起始码扫描的单次补读量 (字节)
const REFILL_CHUNK: usize = 4096;

/// 字节流扫描器
///
/// 内部缓冲区只增不减: 已扫描过的数据保留在缓冲区中, 解析器通过
/// 字节偏移量引用各 NAL 单元, 无须额外拷贝.
pub struct StreamScanner<R: Read> {
    reader: R,
    /// 已读入的码流数据
    pub buffer: Vec<u8>,
}

impl<R: Read> StreamScanner<R> {
    /// 创建新的扫描器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }

    /// 从输入源补充至少 `min_size` 字节到缓冲区
    ///
    /// 先扩容再读满剩余容量. 输入提前耗尽时返回 [`LiuxiError::Eof`],
    /// 已读到的部分数据仍保留在缓冲区中.
    pub fn fill(&mut self, min_size: usize) -> LiuxiResult<()> {
        if self.buffer.capacity() - self.buffer.len() < min_size {
            self.buffer.try_reserve_exact(min_size).map_err(|_| {
                LiuxiError::OutOfMemory(format!(
                    "缓冲区扩容失败, 请求 {} 字节",
                    self.buffer.len() + min_size
                ))
            })?;
        }
        let want = self.buffer.capacity() - self.buffer.len();
        let got = (&mut self.reader)
            .take(want as u64)
            .read_to_end(&mut self.buffer)?;
        if got < want {
            return Err(LiuxiError::Eof);
        }
        Ok(())
    }

    /// 确保缓冲区中至少有 `upto` 字节可读
    ///
    /// 访问单元扫描在读取起始码之后的 NAL 头字节前调用, 保证
    /// 所需偏移量不越界. 输入耗尽且数据仍不足时返回
    /// [`LiuxiError::Eof`].
    pub fn ensure_readable(&mut self, upto: usize) -> LiuxiResult<()> {
        if self.buffer.len() >= upto {
            return Ok(());
        }
        match self.fill(upto - self.buffer.len()) {
            Ok(()) => Ok(()),
            Err(LiuxiError::Eof) if self.buffer.len() >= upto => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 从 `offset` 起查找下一个起始码 `00 00 01`
    ///
    /// 返回起始码首字节在缓冲区中的偏移量. 缓冲区内未找到时自动
    /// 补读数据继续查找; 输入耗尽且缓冲区剩余部分也无起始码时
    /// 返回 [`LiuxiError::Eof`].
    pub fn find_start_code(&mut self, offset: usize) -> LiuxiResult<usize> {
        let mut pos = offset;
        let mut exhausted = false;
        loop {
            while pos + 3 <= self.buffer.len() {
                if self.buffer[pos] == 0x00
                    && self.buffer[pos + 1] == 0x00
                    && self.buffer[pos + 2] == 0x01
                {
                    return Ok(pos);
                }
                pos += 1;
            }
            if exhausted {
                return Err(LiuxiError::Eof);
            }
            match self.fill(REFILL_CHUNK) {
                Ok(()) => {}
                Err(LiuxiError::Eof) => exhausted = true,
                Err(e) => return Err(e),
            }
        }
    }
}

/// 去除防竞争字节, 将转义载荷转换为 RBSP
///
/// 序列 `00 00 03` 后跟 `00`/`01`/`02`/`03` 时, 其中的 `0x03` 为
/// 防竞争字节, 予以删除; 后跟其他值时 `0x03` 属于正常载荷, 保留.
pub fn to_rbsp(data: &[u8]) -> LiuxiResult<Vec<u8>> {
    let mut rbsp = Vec::new();
    rbsp.try_reserve_exact(data.len())
        .map_err(|_| LiuxiError::OutOfMemory(format!("RBSP 缓冲区分配失败, {} 字节", data.len())))?;

    // state: 0 = 无零, 1 = 一个零, 2 = 两个零, 3 = 刚跳过 0x03 待定夺
    let mut state = 0u8;
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if state == 0 && b == 0 {
            state = 1;
        } else if state == 1 && b == 0 {
            state = 2;
        } else if state == 2 && b == 3 {
            state = 3;
            i += 1;
            continue;
        } else if state == 3 && b == 0 {
            state = 1;
        } else if state == 3 && (b == 1 || b == 2 || b == 3) {
            state = 0;
        } else if state == 3 {
            // 0x03 后跟大于 3 的值, 不是防竞争字节, 补回
            rbsp.push(3);
            state = 0;
        } else {
            state = 0;
        }
        rbsp.push(b);
        i += 1;
    }
    Ok(rbsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_find_start_code_basic() {
        let data = vec![0xFF, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x01, 0x68];
        let mut scanner = StreamScanner::new(Cursor::new(data));
        assert_eq!(scanner.find_start_code(0).unwrap(), 1);
        assert_eq!(scanner.find_start_code(2).unwrap(), 6);
    }

    #[test]
    fn test_find_start_code_eof_keeps_data() {
        // 无起始码, 耗尽输入后返回 Eof, 数据保留
        let data = vec![0x11u8; 100];
        let mut scanner = StreamScanner::new(Cursor::new(data));
        assert!(matches!(
            scanner.find_start_code(0),
            Err(LiuxiError::Eof)
        ));
        assert_eq!(scanner.buffer.len(), 100);
    }

    #[test]
    fn test_find_start_code_across_refills() {
        // 起始码位于首次补读边界之后
        let mut data = vec![0u8; 5000];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 7 + 4) as u8;
        }
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0x65]);
        let mut scanner = StreamScanner::new(Cursor::new(data));
        assert_eq!(scanner.find_start_code(0).unwrap(), 5000);
    }

    #[test]
    fn test_ensure_readable() {
        let data = vec![0x00u8, 0x00, 0x01, 0x67, 0x42];
        let mut scanner = StreamScanner::new(Cursor::new(data));
        // 输入耗尽但数据已足够
        assert!(scanner.ensure_readable(5).is_ok());
        assert!(scanner.ensure_readable(4).is_ok());
        // 超出输入总量
        assert!(matches!(
            scanner.ensure_readable(6),
            Err(LiuxiError::Eof)
        ));
    }

    #[test]
    fn test_fill_partial_on_eof() {
        let data = vec![0xAAu8; 10];
        let mut scanner = StreamScanner::new(Cursor::new(data));
        assert!(matches!(scanner.fill(64), Err(LiuxiError::Eof)));
        assert_eq!(scanner.buffer, vec![0xAAu8; 10]);
    }

    #[test]
    fn test_to_rbsp_removes_escape() {
        // 00 00 03 01 → 00 00 01
        assert_eq!(to_rbsp(&[0x00, 0x00, 0x03, 0x01]).unwrap(), vec![0x00, 0x00, 0x01]);
        // 00 00 03 00 → 00 00 00
        assert_eq!(to_rbsp(&[0x00, 0x00, 0x03, 0x00]).unwrap(), vec![0x00, 0x00, 0x00]);
        // 连续两组转义
        assert_eq!(
            to_rbsp(&[0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x02]).unwrap(),
            vec![0x00, 0x00, 0x00, 0x00, 0x02]
        );
    }

    #[test]
    fn test_to_rbsp_keeps_payload_03() {
        // 0x03 后跟大于 3 的字节时属于正常载荷
        assert_eq!(
            to_rbsp(&[0x00, 0x00, 0x03, 0x80]).unwrap(),
            vec![0x00, 0x00, 0x03, 0x80]
        );
        // 非零前缀下的 0x03 原样保留
        assert_eq!(
            to_rbsp(&[0x01, 0x03, 0x02]).unwrap(),
            vec![0x01, 0x03, 0x02]
        );
    }

    /// 插入防竞争字节 (to_rbsp 的逆操作)
    fn escape(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut zeros = 0;
        for &b in payload {
            if zeros >= 2 && b <= 3 {
                out.push(3);
                zeros = 0;
            }
            out.push(b);
            if b == 0 {
                zeros += 1;
            } else {
                zeros = 0;
            }
        }
        out
    }

    #[test]
    fn test_to_rbsp_roundtrip() {
        // 伪随机载荷 (偏向小值以制造大量转义点) 转义后还原必须一致
        let mut state: u32 = 0x1234_5678;
        let mut payload = Vec::new();
        for _ in 0..4096 {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let b = (state >> 24) as u8;
            payload.push(if b < 160 { b % 5 } else { b });
        }
        let escaped = escape(&payload);
        assert_eq!(to_rbsp(&escaped).unwrap(), payload);
    }

    #[test]
    fn test_to_rbsp_passthrough() {
        let data = [0x67u8, 0x42, 0xC0, 0x1F, 0x8C, 0x8D];
        assert_eq!(to_rbsp(&data).unwrap(), data.to_vec());
    }
}
