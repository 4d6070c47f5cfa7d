use serde::{Deserialize, Serialize};

use super::MovieId;

/// A movie from the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    /// Unique identifier for the movie
    pub id: MovieId,
    /// Display title, usually with the release year (e.g. "Heat (1995)")
    pub title: String,
    /// Genre tags
    #[serde(default)]
    pub genres: Vec<String>,
}

impl Movie {
    /// Creates a new movie
    pub fn new(id: MovieId, title: String, genres: Vec<String>) -> Self {
        Self { id, title, genres }
    }

    /// Builds a movie from a pipe-separated genre string ("Action|Crime|Thriller")
    pub fn with_genre_list(id: MovieId, title: String, genres: &str) -> Self {
        let genres = genres
            .split('|')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        Self { id, title, genres }
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g == genre)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_movie() {
        let movie = Movie::new(1, "Toy Story (1995)".to_string(), vec!["Animation".to_string()]);
        assert_eq!(movie.title, "Toy Story (1995)");
        assert!(movie.has_genre("Animation"));
        assert!(!movie.has_genre("Horror"));
    }

    #[test]
    fn test_genre_list_parsing() {
        let movie = Movie::with_genre_list(6, "Heat (1995)".to_string(), "Action|Crime| Thriller|");
        assert_eq!(movie.genres, vec!["Action", "Crime", "Thriller"]);
    }
}
