/// TTL presets in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CacheDuration {
    /// Kept until evicted.
    NoExpire,
    Short,
    #[default]
    Medium,
    Long,
    VeryLong,
    /// Thirty days, the longest relative TTL memcached accepts.
    Insane,
}

impl CacheDuration {
    #[must_use]
    pub const fn as_secs(self) -> u32 {
        match self {
            CacheDuration::NoExpire => 0,
            CacheDuration::Short => 60,
            CacheDuration::Medium => 300,
            CacheDuration::Long => 3600,
            CacheDuration::VeryLong => 86_400,
            CacheDuration::Insane => 86_400 * 30,
        }
    }
}

impl From<CacheDuration> for u32 {
    fn from(d: CacheDuration) -> Self {
        d.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert_eq!(u32::from(CacheDuration::default()), 300);
        assert_eq!(CacheDuration::NoExpire.as_secs(), 0);
        assert_eq!(CacheDuration::Insane.as_secs(), 2_592_000);
    }
}
