use serde::{Deserialize, Serialize};

use crate::{admission::Priority, sampler::NetworkClass};

/// Asset-loading policy derived from network class and device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub load_high_quality_images: bool,
    pub enable_video_backgrounds: bool,
    pub preload_animations: bool,
    pub use_compressed_assets: bool,
    pub enable_lazy_loading: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self::for_signals(NetworkClass::Unknown, false)
    }
}

impl NetworkSettings {
    /// Slow links and low-end devices get the lean bundle; an unknown network
    /// keeps images sharp but defers everything heavy.
    pub fn for_signals(network_class: NetworkClass, is_low_end_device: bool) -> Self {
        if network_class == NetworkClass::Slow || is_low_end_device {
            return Self {
                load_high_quality_images: false,
                enable_video_backgrounds: false,
                preload_animations: false,
                use_compressed_assets: true,
                enable_lazy_loading: true,
            };
        }

        match network_class {
            NetworkClass::Fast => Self {
                load_high_quality_images: true,
                enable_video_backgrounds: true,
                preload_animations: true,
                use_compressed_assets: false,
                enable_lazy_loading: false,
            },
            _ => Self {
                load_high_quality_images: true,
                enable_video_backgrounds: false,
                preload_animations: false,
                use_compressed_assets: false,
                enable_lazy_loading: true,
            },
        }
    }
}

/// Keeps the current [`NetworkSettings`] and answers per-asset questions.
#[derive(Debug, Clone, Default)]
pub struct NetworkAwareLoaderPolicy {
    settings: NetworkSettings,
}

impl NetworkAwareLoaderPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_settings(
        &mut self,
        network_class: NetworkClass,
        is_low_end_device: bool,
    ) -> NetworkSettings {
        let next = NetworkSettings::for_signals(network_class, is_low_end_device);
        if next != self.settings {
            tracing::debug!(?network_class, is_low_end_device, "network settings changed");
        }
        self.settings = next;
        next
    }

    pub fn settings(&self) -> NetworkSettings {
        self.settings
    }

    /// Picks the low-quality source only when high-quality images are off and
    /// one was supplied.
    pub fn image_src<'a>(&self, high_src: &'a str, low_src: Option<&'a str>) -> &'a str {
        match low_src {
            Some(low) if !self.settings.load_high_quality_images => low,
            _ => high_src,
        }
    }

    pub fn should_preload(&self, priority: Priority) -> bool {
        if !self.settings.preload_animations {
            return false;
        }
        match priority {
            Priority::High => true,
            Priority::Medium => self.settings.load_high_quality_images,
            Priority::Low => false,
        }
    }

    pub fn should_lazy_load(&self) -> bool {
        self.settings.enable_lazy_loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(class: NetworkClass, low_end: bool) -> NetworkAwareLoaderPolicy {
        let mut policy = NetworkAwareLoaderPolicy::new();
        policy.update_settings(class, low_end);
        policy
    }

    #[test]
    fn slow_network_serves_low_quality_images() {
        let policy = policy(NetworkClass::Slow, false);

        assert!(!policy.settings().load_high_quality_images);
        assert_eq!(policy.image_src("hi.jpg", Some("lo.jpg")), "lo.jpg");
        assert!(policy.should_lazy_load());
    }

    #[test]
    fn missing_low_source_always_returns_high() {
        for (class, low_end) in [
            (NetworkClass::Slow, false),
            (NetworkClass::Fast, false),
            (NetworkClass::Unknown, true),
        ] {
            assert_eq!(policy(class, low_end).image_src("hi.jpg", None), "hi.jpg");
        }
    }

    #[test]
    fn low_end_device_overrides_fast_network() {
        let settings = policy(NetworkClass::Fast, true).settings();
        assert!(settings.use_compressed_assets);
        assert!(!settings.enable_video_backgrounds);
    }

    #[test]
    fn preload_depends_on_priority() {
        let fast = policy(NetworkClass::Fast, false);
        assert!(fast.should_preload(Priority::High));
        assert!(fast.should_preload(Priority::Medium));
        assert!(!fast.should_preload(Priority::Low));

        let unknown = policy(NetworkClass::Unknown, false);
        assert!(!unknown.should_preload(Priority::High));
        assert_eq!(unknown.image_src("hi.jpg", Some("lo.jpg")), "hi.jpg");
        assert!(unknown.should_lazy_load());
    }
}
