//! Resolution cascade from a mirror page to a playable stream.

use reelway_core::config::ResolverConfig;
use tracing::{debug, info, warn};

use crate::errors::ResolveError;
use crate::fetch::{HttpPageFetcher, PageFetcher, absolutize, home_page};
use crate::mirror::classify;
use crate::rules::{self, MAGNET_RULE, PAGE_RULES};
use crate::types::{ContentReference, MirrorKind, ResolvedStream};

/// Resolves content references through an injected page fetcher.
///
/// Never retries. Every failure goes back to the caller, which decides
/// whether another page or mirror is worth trying.
#[derive(Debug)]
pub struct MirrorResolver<F: PageFetcher> {
    fetcher: F,
    referer_override: Option<String>,
}

impl MirrorResolver<HttpPageFetcher> {
    /// Creates a resolver that fetches pages over HTTP.
    ///
    /// # Errors
    /// - `reqwest::Error` - HTTP client could not be constructed
    pub fn from_config(config: &ResolverConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(HttpPageFetcher::new(config)?, config))
    }
}

impl<F: PageFetcher> MirrorResolver<F> {
    pub fn new(fetcher: F, config: &ResolverConfig) -> Self {
        Self {
            fetcher,
            referer_override: config.referer.clone(),
        }
    }

    /// Access to the underlying fetcher, mainly for test assertions.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolves a page into a direct media URL or, failing that, a magnet.
    ///
    /// The page is fetched once. Media rules are tried in order; if none
    /// match, the magnet rule is applied to the same body. Gateway mirrors
    /// cost exactly one more fetch.
    ///
    /// # Errors
    /// - `ResolveError::InvalidUrl` - Reference is not an http(s) URL
    /// - `ResolveError::Network` - A page fetch failed
    /// - `ResolveError::NotFound` - No rule matched the page or gateway page
    /// - `ResolveError::UnsupportedMirror` - Page links to an unsupported mirror
    pub async fn resolve(
        &self,
        reference: &ContentReference,
    ) -> Result<ResolvedStream, ResolveError> {
        let referer = self.referer_for(reference)?;
        let body = self.fetcher.fetch(&reference.source_url, &referer).await?;

        if let Some((rule, candidate)) = rules::first_match(&PAGE_RULES, &body) {
            let media_url = absolutize(&reference.source_url, &candidate);
            debug!("Rule {} extracted {}", rule.name, media_url);
            return self.follow_mirror(media_url, &referer).await;
        }

        match MAGNET_RULE.extract(&body) {
            Some(magnet) => {
                info!("Resolved {} to a magnet link", reference.source_url);
                Ok(ResolvedStream::magnet(magnet))
            }
            None => Err(ResolveError::NotFound {
                url: reference.source_url.clone(),
                what: "media or magnet link",
            }),
        }
    }

    /// Extracts the first magnet link from a page.
    ///
    /// # Errors
    /// - `ResolveError::InvalidUrl` - Reference is not an http(s) URL
    /// - `ResolveError::Network` - The page fetch failed
    /// - `ResolveError::NotFound` - The page has no magnet hyperlink
    pub async fn extract_magnet(&self, reference: &ContentReference) -> Result<String, ResolveError> {
        let referer = self.referer_for(reference)?;
        let body = self.fetcher.fetch(&reference.source_url, &referer).await?;

        MAGNET_RULE
            .extract(&body)
            .ok_or_else(|| ResolveError::NotFound {
                url: reference.source_url.clone(),
                what: "magnet link",
            })
    }

    async fn follow_mirror(
        &self,
        media_url: String,
        referer: &str,
    ) -> Result<ResolvedStream, ResolveError> {
        let Some(kind) = classify(&media_url) else {
            warn!("Unrecognized mirror host: {}", media_url);
            return Err(ResolveError::UnsupportedMirror {
                mirror: "unknown".to_string(),
                url: media_url,
            });
        };

        match kind {
            MirrorKind::DirectFile => {
                info!("Resolved direct media {}", media_url);
                Ok(ResolvedStream::direct(media_url))
            }
            MirrorKind::StreamTape | MirrorKind::UperBox => {
                warn!("Mirror {} is not supported: {}", kind, media_url);
                Err(ResolveError::UnsupportedMirror {
                    mirror: kind.to_string(),
                    url: media_url,
                })
            }
            MirrorKind::HlsGateway | MirrorKind::VcdnGateway => {
                debug!("Following {} gateway {}", kind, media_url);
                let body = self.fetcher.fetch(&media_url, referer).await?;

                // Single hop: whatever the gateway yields is final
                match rules::first_match(rules::gateway_rules(kind), &body) {
                    Some((rule, playable)) => {
                        let playable = absolutize(&media_url, &playable);
                        info!("Gateway rule {} resolved {}", rule.name, playable);
                        Ok(ResolvedStream::direct(playable))
                    }
                    None => Err(ResolveError::NotFound {
                        url: media_url,
                        what: "stream on gateway page",
                    }),
                }
            }
        }
    }

    fn referer_for(&self, reference: &ContentReference) -> Result<String, ResolveError> {
        let home = home_page(&reference.source_url)?;
        Ok(self.referer_override.clone().unwrap_or(home))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FixtureFetcher;
    use crate::types::StreamKind;

    const PAGE_URL: &str = "https://www.movies.example/film-2025/";
    const HOME: &str = "https://www.movies.example/";

    const DIRECT_PAGE: &str = r#"
        <html><body>
          <video id="player"><source src="https://cdn.example/movies/film/index.m3u8" type="application/x-mpegURL"></video>
          <script>var locations = ["https:\/\/vcdnlare.com\/v\/ignored"];</script>
        </body></html>
    "#;

    const HLS_GATEWAY_PAGE: &str = r#"
        <script>var locations = ["https:\/\/vcdnx.com\/embed\/abc123","https:\/\/streamtape.com\/e\/x"];</script>
    "#;

    const HLS_PLAYER_PAGE: &str = r#"
        <script>jwplayer("v").setup({ file:"https:\/\/edge3.cdnhub.example\/hls\/abc123\/master.m3u8", width: "100%" });</script>
    "#;

    const VCDN_GATEWAY_PAGE: &str = r#"
        <script>var locations = ["https://vcdnlare.com/v/xyz789"];</script>
    "#;

    const VCDN_LANDING_PAGE: &str = r#"
        <iframe allowfullscreen src="https://hls2.vcdnx.com/hls/xyz789/index.m3u8?s=1&amp;e=2"></iframe>
    "#;

    const MAGNET_PAGE: &str = r#"
        <div class="links">
          <a href="https://www.movies.example/about">About</a>
          <a class="mv_button_css" href="magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&amp;dn=Film.2025.1080p&amp;tr=udp%3A%2F%2Ftracker.example%3A80">Magnet</a>
        </div>
    "#;

    fn resolver(fetcher: FixtureFetcher) -> MirrorResolver<FixtureFetcher> {
        MirrorResolver::new(fetcher, &ResolverConfig::default())
    }

    #[tokio::test]
    async fn test_direct_source_returned_unmodified() {
        let resolver = resolver(FixtureFetcher::new().with_page(PAGE_URL, DIRECT_PAGE));

        let stream = resolver
            .resolve(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        assert_eq!(
            stream,
            ResolvedStream::direct("https://cdn.example/movies/film/index.m3u8")
        );
        assert_eq!(resolver.fetcher().fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_referer_is_site_home_page() {
        let resolver = resolver(
            FixtureFetcher::new()
                .with_page(PAGE_URL, HLS_GATEWAY_PAGE)
                .with_page("https://vcdnx.com/embed/abc123", HLS_PLAYER_PAGE),
        );

        resolver
            .resolve(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        let requests = resolver.fetcher().requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.referer == HOME));
    }

    #[tokio::test]
    async fn test_referer_override() {
        let config = ResolverConfig {
            referer: Some("https://mirror-home.example/".to_string()),
            ..ResolverConfig::default()
        };
        let resolver = MirrorResolver::new(
            FixtureFetcher::new().with_page(PAGE_URL, DIRECT_PAGE),
            &config,
        );

        resolver
            .resolve(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        assert_eq!(
            resolver.fetcher().requests()[0].referer,
            "https://mirror-home.example/"
        );
    }

    #[tokio::test]
    async fn test_hls_gateway_takes_exactly_one_hop() {
        let resolver = resolver(
            FixtureFetcher::new()
                .with_page(PAGE_URL, HLS_GATEWAY_PAGE)
                .with_page("https://vcdnx.com/embed/abc123", HLS_PLAYER_PAGE),
        );

        let stream = resolver
            .resolve(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        assert_eq!(stream.kind, StreamKind::DirectMedia);
        assert_eq!(
            stream.url,
            "https://edge3.cdnhub.example/hls/abc123/master.m3u8"
        );
        let requests = resolver.fetcher().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].url, "https://vcdnx.com/embed/abc123");
    }

    #[tokio::test]
    async fn test_vcdn_gateway_resolves_hls_host() {
        let resolver = resolver(
            FixtureFetcher::new()
                .with_page(PAGE_URL, VCDN_GATEWAY_PAGE)
                .with_page("https://vcdnlare.com/v/xyz789", VCDN_LANDING_PAGE),
        );

        let stream = resolver
            .resolve(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        assert_eq!(
            stream,
            ResolvedStream::direct("https://hls2.vcdnx.com/hls/xyz789/index.m3u8?s=1&e=2")
        );
        assert_eq!(resolver.fetcher().fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_gateway_without_match_is_not_found() {
        let resolver = resolver(
            FixtureFetcher::new()
                .with_page(PAGE_URL, HLS_GATEWAY_PAGE)
                .with_page("https://vcdnx.com/embed/abc123", "<html>removed</html>"),
        );

        let result = resolver.resolve(&ContentReference::new(PAGE_URL)).await;

        assert!(matches!(result, Err(ResolveError::NotFound { .. })));
        assert_eq!(resolver.fetcher().fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_gateway_fetch_failure_is_network_error() {
        let resolver = resolver(FixtureFetcher::new().with_page(PAGE_URL, HLS_GATEWAY_PAGE));

        let result = resolver.resolve(&ContentReference::new(PAGE_URL)).await;

        assert!(matches!(result, Err(ResolveError::Network { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_mirrors_fail_loudly() {
        for (page, mirror) in [
            (r#"var locations = ["https://streamtape.com/e/abc"];"#, "streamtape"),
            (r#"var locations = ["https://uperbox.io/f/abc"];"#, "uperbox"),
            (r#"var locations = ["https://unknown-host.example/v/1"];"#, "unknown"),
        ] {
            let resolver = resolver(FixtureFetcher::new().with_page(PAGE_URL, page));

            let result = resolver.resolve(&ContentReference::new(PAGE_URL)).await;

            match result {
                Err(ResolveError::UnsupportedMirror { mirror: got, .. }) => {
                    assert_eq!(got, mirror)
                }
                other => panic!("expected UnsupportedMirror, got {other:?}"),
            }
            assert_eq!(resolver.fetcher().fetch_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_magnet_fallback_uses_same_body() {
        let resolver = resolver(FixtureFetcher::new().with_page(PAGE_URL, MAGNET_PAGE));

        let stream = resolver
            .resolve(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        assert_eq!(stream.kind, StreamKind::Magnet);
        assert!(stream.url.starts_with("magnet:?xt=urn:btih:c12fe1c0"));
        assert!(stream.url.contains("&dn=Film.2025.1080p&tr="));
        assert_eq!(resolver.fetcher().fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_extract_magnet() {
        let resolver = resolver(FixtureFetcher::new().with_page(PAGE_URL, MAGNET_PAGE));

        let magnet = resolver
            .extract_magnet(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        assert!(!magnet.contains("&amp;"));
        assert!(magnet.starts_with("magnet:?"));
    }

    #[tokio::test]
    async fn test_extract_magnet_absent_is_not_found() {
        let resolver = resolver(FixtureFetcher::new().with_page(PAGE_URL, DIRECT_PAGE));

        let result = resolver
            .extract_magnet(&ContentReference::new(PAGE_URL))
            .await;

        assert_eq!(
            result,
            Err(ResolveError::NotFound {
                url: PAGE_URL.to_string(),
                what: "magnet link",
            })
        );
    }

    #[tokio::test]
    async fn test_empty_page_is_not_found() {
        let resolver = resolver(FixtureFetcher::new().with_page(PAGE_URL, "<html></html>"));

        let result = resolver.resolve(&ContentReference::new(PAGE_URL)).await;

        assert!(matches!(result, Err(ResolveError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_invalid_reference_never_fetches() {
        let resolver = resolver(FixtureFetcher::new());

        let result = resolver
            .resolve(&ContentReference::new("file:///etc/passwd"))
            .await;

        assert!(matches!(result, Err(ResolveError::InvalidUrl { .. })));
        assert_eq!(resolver.fetcher().fetch_count(), 0);
    }
}
