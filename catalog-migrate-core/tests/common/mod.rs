#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

use catalog_migrate_core::contract::SourceClient;
use catalog_migrate_core::error::SourceError;
use catalog_migrate_core::store::StoreConvention;

pub const BASE_URL: &str = "https://source.test";
pub const STORES_ROOT: &str = "/content/stores";
pub const STORE_A: &str = "/content/stores/a";
pub const STORE_SUB: &str = "/content/stores/a/sub";
pub const PHONE_IMAGE: &str = "https://source.test/content/dam/phone.png";

pub fn convention() -> StoreConvention {
    StoreConvention::new(Url::parse(BASE_URL).unwrap(), STORES_ROOT)
}

pub fn page_url(store_path: &str) -> String {
    format!("{BASE_URL}{store_path}.html")
}

pub const PAGE_A: &str = r#"<!DOCTYPE html>
<html>
<head><title>Store A</title></head>
<body>
  <nav class="cmp-breadcrumb">
    <ol>
      <li class="cmp-breadcrumb__item">Catalog</li>
      <li class="cmp-breadcrumb__item">A</li>
    </ol>
  </nav>
  <main>
    <div class="cmp-tabs">
      <ol class="cmp-tabs__tablist">
        <li class="cmp-tabs__tab cmp-tabs__tab--active">Products</li>
        <li class="cmp-tabs__tab">Help</li>
      </ol>
      <div class="cmp-tabs__tabpanel">
        <div class="cmp-accordion">
          <div class="cmp-accordion__item" data-synonym="goods">
            <h3 class="cmp-accordion__header">
              <button class="cmp-accordion__button"><span class="cmp-accordion__title">Phones</span></button>
            </h3>
            <div class="cmp-accordion__panel">
              <div class="cmp-teaser">
                <div class="cmp-teaser__image"><img src="/content/dam/phone.png" alt=""></div>
                <div class="cmp-teaser__content">
                  <p class="cmp-teaser__pretitle">Mobile</p>
                  <h2 class="cmp-teaser__title"><a href="/shop/phone.html">Phone X</a></h2>
                  <div class="cmp-teaser__description"><p>Best phone</p></div>
                </div>
              </div>
            </div>
          </div>
        </div>
      </div>
      <div class="cmp-tabs__tabpanel">
        <div class="cmp-text"><p>Call us at <a href="tel:123">123</a></p></div>
        <div class="cmp-button"><span class="cmp-button__text">No link</span></div>
      </div>
    </div>
    <a class="cmp-button" href="/content/stores/a/sub.html"><span class="cmp-button__text">Sub</span></a>
  </main>
</body>
</html>
"#;

pub const PAGE_SUB: &str = r#"<!DOCTYPE html>
<html>
<head><title>Sub</title></head>
<body>
  <nav class="cmp-breadcrumb">
    <ol>
      <li class="cmp-breadcrumb__item">Catalog</li>
      <li class="cmp-breadcrumb__item">A</li>
      <li class="cmp-breadcrumb__item">Sub</li>
    </ol>
  </nav>
  <main>
    <div class="cmp-title"><h2 class="cmp-title__text">Accessories</h2></div>
    <a class="cmp-button" href="/content/stores/a.html"><span class="cmp-button__text">Back</span></a>
  </main>
</body>
</html>
"#;

/// Serves canned responses and records every requested URL.
#[derive(Default)]
pub struct FakeSource {
    responses: HashMap<String, Result<Vec<u8>, u16>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both stores plus the teaser image.
    pub fn catalog() -> Self {
        Self::new()
            .with_page(STORE_A, PAGE_A)
            .with_page(STORE_SUB, PAGE_SUB)
            .with_body(PHONE_IMAGE, b"PNG")
    }

    pub fn with_page(self, store_path: &str, html: &str) -> Self {
        self.with_body(&page_url(store_path), html.as_bytes())
    }

    pub fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.responses.insert(url.to_string(), Ok(body.to_vec()));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), Err(status));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, SourceError> {
        self.calls.lock().unwrap().push(url.to_string());
        let url = url.to_string();
        match self.responses.get(&url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status @ (401 | 403))) => Err(SourceError::Unauthorized {
                url,
                status: *status,
            }),
            Some(Err(status)) => Err(SourceError::Status {
                url,
                status: *status,
            }),
            None => Err(SourceError::NotFound { url }),
        }
    }
}
