//! AES-128 分组密码

use super::SectorCipher;
use aes::{
    cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit},
    Aes128,
};

/// AES-128
pub struct Aes128Cipher {
    inner: Aes128,
}

impl Aes128Cipher {
    /// 用 128 位密钥创建
    pub fn new(key: &[u8; 16]) -> Self {
        Self {
            inner: Aes128::new(GenericArray::from_slice(key)),
        }
    }
}

impl SectorCipher for Aes128Cipher {
    fn block_size(&self) -> usize {
        16
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        self.inner.encrypt_block(GenericArray::from_mut_slice(block));
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        self.inner.decrypt_block(GenericArray::from_mut_slice(block));
    }
}
