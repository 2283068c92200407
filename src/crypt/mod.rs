//! 扇区加密
//!
//! 加密按文件内偏移进行：每个整块先与块序号（小端写入块首 8 字节）异或，再
//! 交给分组密码；扇区末尾不足一块的字节与“序号块”加密后的结果异或。扇区数据
//! 只加密文件范围内的部分，因此解密时必须使用加密时的有效长度，见
//! [`EncryptionState::size_encrypted`]。

#[cfg(feature = "aes")]
mod aes128;

#[cfg(feature = "aes")]
pub use aes128::Aes128Cipher;

use alloc::{boxed::Box, vec};
use core::fmt;
use byteorder::{ByteOrder, LittleEndian};

/// 分组密码
pub trait SectorCipher {
    /// 分组大小（字节，至少 8）
    fn block_size(&self) -> usize;

    /// 原地加密一个分组
    fn encrypt_block(&self, block: &mut [u8]);

    /// 原地解密一个分组
    fn decrypt_block(&self, block: &mut [u8]);
}

/// 打开文件的加密状态
pub struct EncryptionState {
    cipher: Box<dyn SectorCipher>,
    /// 盘上已加密数据延伸到的文件偏移
    pub size_encrypted: u32,
}

impl fmt::Debug for EncryptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionState")
            .field("block_size", &self.cipher.block_size())
            .field("size_encrypted", &self.size_encrypted)
            .finish()
    }
}

impl EncryptionState {
    /// 创建加密状态，`size_encrypted` 为盘上已有密文的长度
    pub fn new(cipher: Box<dyn SectorCipher>, size_encrypted: u32) -> Self {
        Self {
            cipher,
            size_encrypted,
        }
    }

    /// 使用的分组密码
    pub fn cipher(&self) -> &dyn SectorCipher {
        &*self.cipher
    }

    /// 加密从文件偏移 `file_off` 开始的扇区数据
    pub fn encrypt(&self, file_off: u32, data: &mut [u8]) {
        apply(&*self.cipher, file_off, data, true);
    }

    /// 解密从文件偏移 `file_off` 开始的扇区数据
    pub fn decrypt(&self, file_off: u32, data: &mut [u8]) {
        apply(&*self.cipher, file_off, data, false);
    }
}

fn tweak(block: &mut [u8], index: u64) {
    block.fill(0);
    LittleEndian::write_u64(&mut block[..8], index);
}

fn apply(cipher: &dyn SectorCipher, file_off: u32, data: &mut [u8], encrypt: bool) {
    let bs = cipher.block_size();
    let base = file_off as u64 / bs as u64;
    let full = (data.len() / bs) as u64;
    let mut t = vec![0u8; bs];

    let mut chunks = data.chunks_exact_mut(bs);
    for (i, block) in (&mut chunks).enumerate() {
        tweak(&mut t, base + i as u64);
        if encrypt {
            block.iter_mut().zip(&t).for_each(|(b, k)| *b ^= k);
            cipher.encrypt_block(block);
        } else {
            cipher.decrypt_block(block);
            block.iter_mut().zip(&t).for_each(|(b, k)| *b ^= k);
        }
    }

    let tail = chunks.into_remainder();
    if !tail.is_empty() {
        tweak(&mut t, base + full);
        cipher.encrypt_block(&mut t);
        tail.iter_mut().zip(&t).for_each(|(b, k)| *b ^= k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::XorCipher;

    #[test]
    fn test_whole_blocks_use_position() {
        let state = EncryptionState::new(Box::new(XorCipher(0x5A)), 0);
        let mut a = [7u8; 32];
        let mut b = [7u8; 32];
        state.encrypt(0, &mut a);
        state.encrypt(512, &mut b);
        assert_ne!(a, [7u8; 32]);
        // 同样的明文在不同偏移得到不同密文
        assert_ne!(a, b);
        assert_ne!(a[..16], a[16..]);

        state.decrypt(0, &mut a);
        state.decrypt(512, &mut b);
        assert_eq!(a, [7u8; 32]);
        assert_eq!(b, [7u8; 32]);
    }

    #[test]
    fn test_partial_tail() {
        let state = EncryptionState::new(Box::new(XorCipher(0x33)), 0);
        let plain: alloc::vec::Vec<u8> = (0..21u8).collect();
        let mut data = plain.clone();
        state.encrypt(1024, &mut data);
        assert_ne!(data[16..], plain[16..]);
        state.decrypt(1024, &mut data);
        assert_eq!(data, plain);

        // 短于一块
        let mut short = [1u8, 2, 3];
        state.encrypt(0, &mut short);
        assert_ne!(short, [1, 2, 3]);
        state.decrypt(0, &mut short);
        assert_eq!(short, [1, 2, 3]);
    }

    #[test]
    fn test_debug_hides_cipher() {
        let state = EncryptionState::new(Box::new(XorCipher(0x33)), 40);
        let text = alloc::format!("{:?}", state);
        assert_eq!(text, "EncryptionState { block_size: 16, size_encrypted: 40 }");
    }
}
