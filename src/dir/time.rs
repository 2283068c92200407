//! MS-DOS 日期 / 时间编码
//!
//! 时间：bit 0-4 秒/2，bit 5-10 分，bit 11-15 时。
//! 日期：bit 0-4 日，bit 5-8 月，bit 9-15 年-1980。

use core::time::Duration;

/// 打包后的 DOS 日期时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    /// 秒/2、分、时
    pub time: u16,
    /// 日、月、年-1980
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00
    pub const EPOCH: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// 从 UNIX 时间戳转换（UTC），早于 1980 年的取 1980-01-01
    pub fn from_unix(since_epoch: Duration) -> Self {
        let secs = since_epoch.as_secs();
        let days = (secs / 86_400) as i64;
        let rem = secs % 86_400;
        let (year, month, day) = civil_from_days(days);
        if !(1980..=2107).contains(&year) {
            return Self::EPOCH;
        }

        let hour = (rem / 3600) as u16;
        let minute = ((rem % 3600) / 60) as u16;
        let second = (rem % 60) as u16;
        Self {
            time: (second / 2) | (minute << 5) | (hour << 11),
            date: day as u16 | ((month as u16) << 5) | (((year - 1980) as u16) << 9),
        }
    }

    /// 解包 (年, 月, 日, 时, 分, 秒)
    pub fn fields(&self) -> (u32, u32, u32, u32, u32, u32) {
        (
            1980 + (self.date >> 9) as u32,
            ((self.date >> 5) & 0x0F) as u32,
            (self.date & 0x1F) as u32,
            (self.time >> 11) as u32,
            ((self.time >> 5) & 0x3F) as u32,
            ((self.time & 0x1F) * 2) as u32,
        )
    }
}

/// 天数 → (年, 月, 日)，公历
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FIXED_UNIX_SECS;

    #[test]
    fn test_known_timestamp() {
        let dt = DosDateTime::from_unix(Duration::from_secs(FIXED_UNIX_SECS));
        assert_eq!(dt.fields(), (2024, 3, 15, 10, 30, 20));
        assert_eq!(dt.time, (10 << 11) | (30 << 5) | 10);
        assert_eq!(dt.date, (44 << 9) | (3 << 5) | 15);
    }

    #[test]
    fn test_leap_day() {
        // 2000-02-29 23:59:59
        let dt = DosDateTime::from_unix(Duration::from_secs(951_868_799));
        assert_eq!(dt.fields(), (2000, 2, 29, 23, 59, 58));
    }

    #[test]
    fn test_before_1980_clamps() {
        let dt = DosDateTime::from_unix(Duration::from_secs(0));
        assert_eq!(dt.fields(), (1980, 1, 1, 0, 0, 0));
    }
}
