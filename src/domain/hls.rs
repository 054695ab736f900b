use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub struct Variant {
    /// Peak bits per second.
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub uri: String,
}

/// HLS master playlist listing one media playlist per rendition.
pub struct MasterPlaylist {
    pub version: u8,
    pub independent_segments: bool,
    pub variants: Vec<Variant>,
}

impl MasterPlaylist {
    pub fn new() -> Self {
        Self {
            version: 3,
            independent_segments: true,
            variants: Vec::new(),
        }
    }

    pub fn add_variant(&mut self, bandwidth: u64, resolution: Option<(u32, u32)>, uri: String) {
        self.variants.push(Variant {
            bandwidth,
            resolution,
            uri,
        });
    }

    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));
        if self.independent_segments {
            out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
        }
        for variant in &self.variants {
            out.push_str(&format!("#EXT-X-STREAM-INF:BANDWIDTH={}", variant.bandwidth));
            if let Some((w, h)) = variant.resolution {
                out.push_str(&format!(",RESOLUTION={}x{}", w, h));
            }
            out.push('\n');
            out.push_str(&variant.uri);
            out.push('\n');
        }
        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path).await?;
        file.write_all(self.render().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl Default for MasterPlaylist {
    fn default() -> Self {
        Self::new()
    }
}
