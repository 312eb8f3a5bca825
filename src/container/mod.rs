//! Single-file project containers.
//!
//! A container is an SVG document that embeds everything a project needs:
//!
//! ```text
//! <svg xmlns=... xmlns:xlink=... xmlns:ytb=...>
//! ├── <title>, <desc>                    # title, escaped source text
//! ├── <metadata id="project-metadata">
//! │   └── <ytb:project>{json}</...>      # authoritative ProjectMetadata
//! ├── <g id="layer-background">
//! ├── <g id="layer-thumbnail">           # <image id="thumb" href=data:...>
//! ├── <g id="layer-title">
//! └── <g id="layer-player">              # <video id="media-video">, <audio id="media-audio">
//! ```

pub mod builder;
pub mod datauri;
pub mod escape;
pub mod extract;

pub use builder::{AssetSource, BuildAssets, BuiltContainer, ContainerBuilder};
pub use datauri::DataUri;
pub use extract::{extract_description, extract_media_sources, extract_metadata};

/// SVG namespace of the root element
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Product namespace for the metadata block
pub const YTB_NS: &str = "https://ytlite.com/ns";

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Version written into every metadata block
pub const FORMAT_VERSION: &str = "1.0";

/// File extension of active containers and snapshots
pub const CONTAINER_EXT: &str = "svg";

/// Root element name
pub const ROOT_ELEMENT: &str = "svg";
