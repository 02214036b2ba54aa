//! Exp-Golomb 可变长编码读取.
//!
//! H.264 与 HEVC 的头部语法大量使用 Exp-Golomb 编码:
//! - `ue(v)`: 无符号, 形如 `k` 个前导零 + 终止位 1 + `k` 位余数,
//!   取值 `2^k - 1 + r`;
//! - `se(v)`: 有符号, 由 `ue(v)` 的 codeNum 映射而来
//!   (0→0, 1→1, 2→-1, 3→2, 4→-2, ...).
//!
//! 两个编解码器的头部共用同一套数值语义, 因此实现放在 core 中.

use crate::bitreader::BitCursor;

/// 读取无符号 Exp-Golomb 编码值 ue(v)
///
/// 统计前导零位数时若游标到达末尾则立即返回 0; 此时调用方应通过
/// [`BitCursor::at_eof`] 判定本段语法是否完整.
pub fn read_ue(bc: &mut BitCursor) -> u32 {
    let mut leading_zeros: u32 = 0;
    loop {
        let bit = bc.read_bit();
        if bc.at_eof() {
            return 0;
        }
        if bit == 1 {
            break;
        }
        leading_zeros += 1;
    }

    if leading_zeros == 0 {
        return 0;
    }

    // 余数按 8 位一组累积; 64 位回绕运算与原生无符号溢出语义一致,
    // 垃圾数据下不会 panic
    let mut base: u64 = 1;
    for _ in 0..leading_zeros {
        base = base.wrapping_mul(2);
    }
    let mut remain: u64 = 0;
    let mut left = leading_zeros;
    while left > 0 {
        let chunk = left.min(8);
        remain = remain.wrapping_shl(chunk) | u64::from(bc.read_bits(chunk));
        left -= chunk;
    }

    base.wrapping_sub(1).wrapping_add(remain) as u32
}

/// 读取有符号 Exp-Golomb 编码值 se(v)
pub fn read_se(bc: &mut BitCursor) -> i64 {
    let code_num = i64::from(read_ue(bc));
    if code_num % 2 == 0 {
        -(code_num / 2)
    } else {
        (code_num + 1) / 2
    }
}
