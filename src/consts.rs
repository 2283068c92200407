//! FAT 存储核心常量定义
//!
//! 这个模块包含了存储核心的常量定义，包括：
//! - 扇区缓存的管理结构布局
//! - FAT 表项标记值
//! - 目录项字段偏移
//! - 引导扇区（BPB）字段偏移

//=============================================================================
// 基础常量
//=============================================================================

/// 默认扇区大小（512 字节）
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// FAT 文件最大长度（32 位大小字段）
pub const FAT_MAX_FILE_SIZE: u32 = u32::MAX;

//=============================================================================
// 扇区缓存
//=============================================================================

/// 无效扇区号（缓存块空闲）
pub const CACHE_SECTOR_INVALID: u32 = u32::MAX;

/// 管理结构大小（字节）
///
/// `numBytesManaged: u32, ldAssocLevel: u16, <pad 2>, sectorSize: u32,
/// numSets: u32, modes: [u8; 3], <pad 1>`
pub const CACHE_MANAGEMENT_SIZE: usize = 20;

/// 缓存块头大小（字节）：`sectorIndex: u32, accessCount: u16, isDirty: u16`
pub const CACHE_BLOCK_HEADER_SIZE: usize = 8;

/// 访问计数饱和值
pub const CACHE_ACCESS_COUNT_MAX: u16 = 0xFFFF;

/// 默认相联度（每组路数）
pub const CACHE_DEFAULT_ASSOC_LEVEL: u32 = 2;

/// 缓存类型标识（多路组相联）
pub const CACHE_TYPE_MULTI_WAY: u32 = 3;

/// 区域对齐要求（字节）
pub const CACHE_REGION_ALIGN: usize = 4;

//=============================================================================
// FAT 表
//=============================================================================

/// 空闲簇表项
pub const FAT_ENTRY_FREE: u32 = 0;

/// 第一个数据簇编号
pub const FAT_FIRST_CLUSTER: u32 = 2;

/// FAT12 链尾标记（写入值）
pub const FAT12_EOC: u32 = 0x0FFF;

/// FAT16 链尾标记（写入值）
pub const FAT16_EOC: u32 = 0xFFFF;

/// FAT32 链尾标记（写入值）
pub const FAT32_EOC: u32 = 0x0FFF_FFFF;

/// FAT32 表项有效位掩码（高 4 位保留）
pub const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;

/// FAT12 卷最大簇数（不含）
pub const FAT12_MAX_CLUSTERS: u32 = 4085;

/// FAT16 卷最大簇数（不含）
pub const FAT16_MAX_CLUSTERS: u32 = 65525;

//=============================================================================
// 引导扇区（BPB）字段偏移
//=============================================================================

/// 每扇区字节数 (u16)
pub const BPB_BYTES_PER_SECTOR: usize = 11;
/// 每簇扇区数 (u8)
pub const BPB_SECTORS_PER_CLUSTER: usize = 13;
/// 保留扇区数 (u16)
pub const BPB_RESERVED_SECTORS: usize = 14;
/// FAT 份数 (u8)
pub const BPB_NUM_FATS: usize = 16;
/// 根目录项数 (u16)，FAT32 为 0
pub const BPB_ROOT_ENTRIES: usize = 17;
/// 总扇区数 (u16)
pub const BPB_TOTAL_SECTORS_16: usize = 19;
/// 每 FAT 扇区数 (u16)，FAT32 为 0
pub const BPB_FAT_SIZE_16: usize = 22;
/// 总扇区数 (u32)
pub const BPB_TOTAL_SECTORS_32: usize = 32;
/// FAT32 每 FAT 扇区数 (u32)
pub const BPB_FAT_SIZE_32: usize = 36;
/// FAT32 根目录起始簇 (u32)
pub const BPB_ROOT_CLUSTER: usize = 44;
/// 引导扇区签名偏移 (0x55 0xAA)
pub const BPB_SIGNATURE: usize = 510;

//=============================================================================
// 目录项
//=============================================================================

/// 目录项大小（字节）
pub const DIR_ENTRY_SIZE: usize = 32;

/// 8.3 名称长度
pub const DIR_NAME_LEN: usize = 11;
/// 属性字节偏移
pub const DIR_OFF_ATTR: usize = 11;
/// 创建时间偏移 (u16)
pub const DIR_OFF_CREATE_TIME: usize = 14;
/// 创建日期偏移 (u16)
pub const DIR_OFF_CREATE_DATE: usize = 16;
/// 访问日期偏移 (u16)
pub const DIR_OFF_ACCESS_DATE: usize = 18;
/// 首簇高 16 位偏移 (u16)
pub const DIR_OFF_CLUSTER_HIGH: usize = 20;
/// 修改时间偏移 (u16)
pub const DIR_OFF_WRITE_TIME: usize = 22;
/// 修改日期偏移 (u16)
pub const DIR_OFF_WRITE_DATE: usize = 24;
/// 首簇低 16 位偏移 (u16)
pub const DIR_OFF_CLUSTER_LOW: usize = 26;
/// 文件大小偏移 (u32)
pub const DIR_OFF_SIZE: usize = 28;

/// 已删除目录项标记
pub const DIR_ENTRY_DELETED: u8 = 0xE5;
/// 目录结束标记
pub const DIR_ENTRY_END: u8 = 0x00;

/// 递归删除预算：无上限
pub const RECURSION_UNBOUNDED: i32 = -1;
