use std::sync::Arc;

use crate::config::{NavigationLink, SiteSettings};
use crate::presentation::views::{
    AssetsView, BrandView, HeaderView, LayoutChrome, NavigationLinkView, NavigationView,
    PageMetaView,
};

/// Supplies the page shell. Built once from site settings; every page shares it.
#[derive(Clone)]
pub struct ChromeService {
    chrome: Arc<LayoutChrome>,
}

impl ChromeService {
    pub fn new(settings: &SiteSettings) -> Self {
        let entries = settings.navigation.iter().map(map_navigation_link).collect();

        let chrome = LayoutChrome {
            brand: BrandView {
                title: settings.brand_title.clone(),
                href: settings.brand_href.clone(),
            },
            navigation: NavigationView { entries },
            header: HeaderView {
                title: settings.header_title.clone(),
            },
            meta: PageMetaView {
                title: settings.meta_title.clone(),
                description: settings.meta_description.clone(),
            },
            assets: AssetsView {
                datastar_src: settings.datastar_src.clone(),
            },
        };

        Self {
            chrome: Arc::new(chrome),
        }
    }

    pub fn load(&self) -> LayoutChrome {
        self.chrome.as_ref().clone()
    }
}

fn map_navigation_link(link: &NavigationLink) -> NavigationLinkView {
    let mut view = NavigationLinkView {
        label: link.label.clone(),
        href: link.href.clone(),
        target: None,
        rel: None,
    };

    if link.external {
        view.target = Some("_blank".to_string());
        view.rel = Some("noopener noreferrer".to_string());
    }

    view
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_links_open_in_a_new_tab() {
        let mut settings = SiteSettings::default();
        settings.navigation = vec![
            NavigationLink {
                label: "Home".into(),
                href: "/".into(),
                external: false,
            },
            NavigationLink {
                label: "Source".into(),
                href: "https://example.com/repo".into(),
                external: true,
            },
        ];

        let chrome = ChromeService::new(&settings).load();
        let entries = &chrome.navigation.entries;

        assert_eq!(entries.len(), 2);
        assert!(entries[0].target.is_none());
        assert_eq!(entries[1].target.as_deref(), Some("_blank"));
        assert_eq!(entries[1].rel.as_deref(), Some("noopener noreferrer"));
    }

    #[test]
    fn header_defaults_to_post_list() {
        let chrome = ChromeService::new(&SiteSettings::default()).load();
        assert_eq!(chrome.header.title, "Post List");
    }
}
