//! Fake GitHub endpoints served by mockito

use mockito::{Mock, ServerGuard};

pub const NOT_FOUND_BODY: &str = r#"{"message": "Not Found"}"#;

/// A mockito server standing in for both the GitHub API and the raw file host.
///
/// Every mock expects to be hit exactly `hits` times.
pub struct FakeGitHub {
    server: ServerGuard,
}

impl FakeGitHub {
    pub async fn start() -> Self {
        Self {
            server: mockito::Server::new_async().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub async fn release(&mut self, project: &str, status: usize, body: &str, hits: usize) -> Mock {
        self.json_mock(&format!("/repos/{project}/releases/latest"), status, body, hits)
            .await
    }

    pub async fn tags(&mut self, project: &str, status: usize, body: &str, hits: usize) -> Mock {
        self.json_mock(&format!("/repos/{project}/tags"), status, body, hits)
            .await
    }

    pub async fn metadata_file(
        &mut self,
        project: &str,
        status: usize,
        body: &str,
        hits: usize,
    ) -> Mock {
        self.server
            .mock("GET", format!("/{project}/master/.et").as_str())
            .with_status(status)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    async fn json_mock(&mut self, path: &str, status: usize, body: &str, hits: usize) -> Mock {
        self.server
            .mock("GET", path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }
}
