// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use std::path::PathBuf;
use std::fs;

/// Get the system-wide storage directory for fskb-indexer.
/// Following XDG Base Directory specification on Unix-like systems
/// and proper conventions on other systems
pub fn get_system_storage_dir() -> Result<PathBuf> {
    let base_dir = if cfg!(target_os = "macos") {
        // macOS: ~/.local/share/fskb-indexer
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".local")
            .join("share")
            .join("fskb-indexer")
    } else if cfg!(target_os = "windows") {
        // Windows: %APPDATA%/fskb-indexer
        dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine data directory"))?
            .join("fskb-indexer")
    } else {
        // Linux and other Unix-like: ~/.local/share/fskb-indexer or $XDG_DATA_HOME/fskb-indexer
        if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg_data_home).join("fskb-indexer")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".local")
                .join("share")
                .join("fskb-indexer")
        }
    };

    // Create the directory if it doesn't exist
    if !base_dir.exists() {
        fs::create_dir_all(&base_dir)?;
    }

    Ok(base_dir)
}

/// Get the system-wide cache directory for shared resources like FastEmbed models
pub fn get_system_cache_dir() -> Result<PathBuf> {
    let cache_dir = if cfg!(target_os = "macos") {
        // macOS: ~/.cache/fskb-indexer
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".cache")
            .join("fskb-indexer")
    } else if cfg!(target_os = "windows") {
        // Windows: %LOCALAPPDATA%/fskb-indexer/cache
        dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine cache directory"))?
            .join("fskb-indexer")
    } else {
        // Linux and other Unix-like: ~/.cache/fskb-indexer or $XDG_CACHE_HOME/fskb-indexer
        if let Ok(xdg_cache_home) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(xdg_cache_home).join("fskb-indexer")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".cache")
                .join("fskb-indexer")
        }
    };

    // Create the directory if it doesn't exist
    if !cache_dir.exists() {
        fs::create_dir_all(&cache_dir)?;
    }

    Ok(cache_dir)
}

/// Get the system-wide FastEmbed cache directory
pub fn get_fastembed_cache_dir() -> Result<PathBuf> {
    let cache_dir = get_system_cache_dir()?.join("fastembed");
    
    // Create the directory if it doesn't exist
    if !cache_dir.exists() {
        fs::create_dir_all(&cache_dir)?;
    }
    
    Ok(cache_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_storage_dir() {
        let storage_dir = get_system_storage_dir().unwrap();
        
        // Should contain "fskb-indexer" in the path
        assert!(storage_dir.to_string_lossy().contains("fskb-indexer"));
        
        // Should be an absolute path
        assert!(storage_dir.is_absolute());
    }

    #[test]
    fn test_system_cache_dir() {
        let cache_dir = get_system_cache_dir().unwrap();
        
        // Should contain "fskb-indexer" in the path
        assert!(cache_dir.to_string_lossy().contains("fskb-indexer"));
        
        // Should be an absolute path
        assert!(cache_dir.is_absolute());
        
        // Should be different from storage directory
        let storage_dir = get_system_storage_dir().unwrap();
        assert_ne!(cache_dir, storage_dir);
    }

    #[test]
    fn test_fastembed_cache_dir() {
        let fastembed_cache = get_fastembed_cache_dir().unwrap();
        
        // Should contain both "fskb-indexer" and "fastembed" in the path
        assert!(fastembed_cache.to_string_lossy().contains("fskb-indexer"));
        assert!(fastembed_cache.to_string_lossy().contains("fastembed"));
        
        // Should be an absolute path
        assert!(fastembed_cache.is_absolute());
    }
}