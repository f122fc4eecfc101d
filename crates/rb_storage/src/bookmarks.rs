use chrono::Utc;
use rb_core::{Bookmark, Category, Error, Paper, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::local::LocalStore;

pub const BOOKMARKS_KEY: &str = "researchbuddy_bookmarks";
pub const CATEGORIES_KEY: &str = "researchbuddy_categories";
pub const DEFAULT_CATEGORY: &str = "to-read";

pub fn default_categories() -> Vec<Category> {
    [
        ("to-read", "To Read", "#3b82f6", "bookmark"),
        ("reading", "Reading", "#f59e0b", "book-open"),
        ("important", "Important", "#ef4444", "star"),
        ("completed", "Completed", "#10b981", "check-circle"),
    ]
    .into_iter()
    .map(|(id, name, color, icon)| Category {
        id: id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        icon: icon.to_string(),
        is_default: true,
    })
    .collect()
}

/// Bookmarks and categories kept as two JSON lists in a [`LocalStore`].
pub struct BookmarkStore<S: LocalStore> {
    store: S,
}

impl<S: LocalStore> BookmarkStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Vec<T>>> {
        match self.store.get_item(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        self.store.set_item(key, &serde_json::to_string(items)?)
    }

    pub fn bookmarks(&self) -> Result<Vec<Bookmark>> {
        Ok(self.load(BOOKMARKS_KEY)?.unwrap_or_default())
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.load(CATEGORIES_KEY)?.unwrap_or_else(default_categories))
    }

    fn require_category(&self, category_id: &str) -> Result<()> {
        if self.categories()?.iter().any(|c| c.id == category_id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Category {} not found", category_id)))
        }
    }

    pub fn get_bookmark(&self, paper_id: &str) -> Result<Option<Bookmark>> {
        Ok(self.bookmarks()?.into_iter().find(|b| b.paper_id == paper_id))
    }

    pub fn is_bookmarked(&self, paper_id: &str) -> Result<bool> {
        Ok(self.get_bookmark(paper_id)?.is_some())
    }

    /// Bookmark a paper. A paper that is already bookmarked only changes category.
    pub fn add_bookmark(&self, paper: Paper, category_id: Option<&str>) -> Result<Bookmark> {
        let category_id = category_id.unwrap_or(DEFAULT_CATEGORY);
        self.require_category(category_id)?;

        let mut bookmarks = self.bookmarks()?;
        let bookmark = match bookmarks.iter_mut().find(|b| b.paper_id == paper.id) {
            Some(existing) => {
                existing.category_id = category_id.to_string();
                existing.clone()
            }
            None => {
                let bookmark = Bookmark {
                    paper_id: paper.id.clone(),
                    paper,
                    category_id: category_id.to_string(),
                    notes: String::new(),
                    added_at: Utc::now(),
                };
                bookmarks.push(bookmark.clone());
                bookmark
            }
        };
        self.save(BOOKMARKS_KEY, &bookmarks)?;
        tracing::debug!("Bookmarked {} in {}", bookmark.paper_id, bookmark.category_id);
        Ok(bookmark)
    }

    pub fn remove_bookmark(&self, paper_id: &str) -> Result<bool> {
        let mut bookmarks = self.bookmarks()?;
        let before = bookmarks.len();
        bookmarks.retain(|b| b.paper_id != paper_id);
        if bookmarks.len() == before {
            return Ok(false);
        }
        self.save(BOOKMARKS_KEY, &bookmarks)?;
        Ok(true)
    }

    fn update_bookmark(&self, paper_id: &str, apply: impl FnOnce(&mut Bookmark)) -> Result<Bookmark> {
        let mut bookmarks = self.bookmarks()?;
        let bookmark = bookmarks
            .iter_mut()
            .find(|b| b.paper_id == paper_id)
            .ok_or_else(|| Error::NotFound(format!("Paper {} is not bookmarked", paper_id)))?;
        apply(bookmark);
        let updated = bookmark.clone();
        self.save(BOOKMARKS_KEY, &bookmarks)?;
        Ok(updated)
    }

    pub fn move_bookmark(&self, paper_id: &str, category_id: &str) -> Result<Bookmark> {
        self.require_category(category_id)?;
        self.update_bookmark(paper_id, |b| b.category_id = category_id.to_string())
    }

    pub fn update_notes(&self, paper_id: &str, notes: &str) -> Result<Bookmark> {
        self.update_bookmark(paper_id, |b| b.notes = notes.to_string())
    }

    pub fn bookmarks_in_category(&self, category_id: &str) -> Result<Vec<Bookmark>> {
        Ok(self
            .bookmarks()?
            .into_iter()
            .filter(|b| b.category_id == category_id)
            .collect())
    }

    pub fn add_category(&self, name: &str, color: &str, icon: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Category name must not be empty".to_string()));
        }
        let mut categories = self.categories()?;
        if categories.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
            return Err(Error::Validation(format!("Category {} already exists", name)));
        }
        let category = Category {
            id: format!("custom-{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            is_default: false,
        };
        categories.push(category.clone());
        self.save(CATEGORIES_KEY, &categories)?;
        Ok(category)
    }

    /// Delete a custom category, moving its bookmarks to the default category.
    /// Returns how many bookmarks were moved.
    pub fn delete_category(&self, category_id: &str) -> Result<usize> {
        let mut categories = self.categories()?;
        let category = categories
            .iter()
            .find(|c| c.id == category_id)
            .ok_or_else(|| Error::NotFound(format!("Category {} not found", category_id)))?;
        if category.is_default {
            return Err(Error::Validation(format!(
                "Default category {} cannot be deleted",
                category_id
            )));
        }

        let previous = self.store.get_item(BOOKMARKS_KEY)?;
        let mut bookmarks = self.bookmarks()?;
        let mut moved = 0;
        for bookmark in bookmarks.iter_mut().filter(|b| b.category_id == category_id) {
            bookmark.category_id = DEFAULT_CATEGORY.to_string();
            moved += 1;
        }
        if moved > 0 {
            self.save(BOOKMARKS_KEY, &bookmarks)?;
        }

        categories.retain(|c| c.id != category_id);
        if let Err(e) = self.save(CATEGORIES_KEY, &categories) {
            if moved > 0 {
                let restored = match &previous {
                    Some(raw) => self.store.set_item(BOOKMARKS_KEY, raw),
                    None => self.store.remove_item(BOOKMARKS_KEY),
                };
                if let Err(restore) = restored {
                    tracing::error!("Failed to restore bookmarks after category write failed: {}", restore);
                }
            }
            return Err(e);
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryLocalStore;
    use rb_core::PaperSource;

    fn paper(id: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: format!("Paper {}", id),
            authors: vec![],
            abstract_text: String::new(),
            published: "2023-01-01T00:00:00Z".to_string(),
            source: PaperSource::Arxiv,
            venue: None,
            citation_count: None,
            pdf_url: None,
            doi: None,
            keywords: vec![],
        }
    }

    fn store() -> BookmarkStore<MemoryLocalStore> {
        BookmarkStore::new(MemoryLocalStore::new())
    }

    #[test]
    fn test_add_and_remove_bookmark() {
        let store = store();
        assert!(!store.is_bookmarked("a").unwrap());

        store.add_bookmark(paper("a"), None).unwrap();
        assert!(store.is_bookmarked("a").unwrap());
        assert_eq!(store.get_bookmark("a").unwrap().unwrap().category_id, DEFAULT_CATEGORY);

        assert!(store.remove_bookmark("a").unwrap());
        assert!(!store.is_bookmarked("a").unwrap());
        assert!(!store.remove_bookmark("a").unwrap());
    }

    #[test]
    fn test_re_adding_updates_category() {
        let store = store();
        store.add_bookmark(paper("a"), None).unwrap();
        store.update_notes("a", "read section 3").unwrap();
        store.add_bookmark(paper("a"), Some("important")).unwrap();

        let bookmarks = store.bookmarks().unwrap();
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].category_id, "important");
        assert_eq!(bookmarks[0].notes, "read section 3");
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let store = store();
        assert!(matches!(
            store.add_bookmark(paper("a"), Some("nope")),
            Err(Error::NotFound(_))
        ));
        store.add_bookmark(paper("a"), None).unwrap();
        assert!(store.move_bookmark("a", "nope").is_err());
        assert!(store.move_bookmark("missing", "reading").is_err());
    }

    #[test]
    fn test_delete_category_reassigns_bookmarks() {
        let store = store();
        let thesis = store.add_category("Thesis", "#8b5cf6", "folder").unwrap();
        store.add_bookmark(paper("a"), Some(&thesis.id)).unwrap();
        store.add_bookmark(paper("b"), Some(&thesis.id)).unwrap();
        store.add_bookmark(paper("c"), Some("reading")).unwrap();

        assert_eq!(store.delete_category(&thesis.id).unwrap(), 2);
        assert!(store.categories().unwrap().iter().all(|c| c.id != thesis.id));
        assert_eq!(store.bookmarks_in_category(DEFAULT_CATEGORY).unwrap().len(), 2);
        assert_eq!(store.get_bookmark("c").unwrap().unwrap().category_id, "reading");
    }

    struct FailingCategories {
        inner: MemoryLocalStore,
        fail: std::sync::atomic::AtomicBool,
    }

    impl LocalStore for FailingCategories {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            if key == CATEGORIES_KEY && self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }
    }

    #[test]
    fn test_failed_category_delete_leaves_bookmarks_untouched() {
        let store = BookmarkStore::new(FailingCategories {
            inner: MemoryLocalStore::new(),
            fail: std::sync::atomic::AtomicBool::new(false),
        });
        let thesis = store.add_category("Thesis", "#8b5cf6", "folder").unwrap();
        store.add_bookmark(paper("a"), Some(&thesis.id)).unwrap();

        store.store.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(store.delete_category(&thesis.id), Err(Error::Storage(_))));
        assert!(store.categories().unwrap().iter().any(|c| c.id == thesis.id));
        assert_eq!(store.get_bookmark("a").unwrap().unwrap().category_id, thesis.id);
    }

    #[test]
    fn test_default_categories_are_protected() {
        let store = store();
        assert_eq!(store.categories().unwrap().len(), 4);
        assert!(matches!(store.delete_category("to-read"), Err(Error::Validation(_))));
        assert!(matches!(store.delete_category("custom-x"), Err(Error::NotFound(_))));
        assert!(store.add_category("reading", "#000", "x").is_err());
        assert!(store.add_category("  ", "#000", "x").is_err());
    }
}
