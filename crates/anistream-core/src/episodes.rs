//! Episode adjacency within a season

use crate::types::Episode;

/// Ordered sibling episodes of one season
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeList {
    episodes: Vec<Episode>,
}

impl EpisodeList {
    /// Build from any order; episodes are sorted by number, ties keep input order
    pub fn new(mut episodes: Vec<Episode>) -> Self {
        episodes.sort_by_key(|episode| episode.number);
        Self { episodes }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Episode> {
        self.episodes.iter()
    }

    pub fn position(&self, episode_id: i64) -> Option<usize> {
        self.episodes.iter().position(|episode| episode.id == episode_id)
    }

    pub fn get(&self, episode_id: i64) -> Option<&Episode> {
        self.episodes.iter().find(|episode| episode.id == episode_id)
    }

    pub fn next_after(&self, episode_id: i64) -> Option<&Episode> {
        let idx = self.position(episode_id)?;
        self.episodes.get(idx + 1)
    }

    pub fn previous_before(&self, episode_id: i64) -> Option<&Episode> {
        let idx = self.position(episode_id)?;
        idx.checked_sub(1).and_then(|prev| self.episodes.get(prev))
    }

    pub fn has_next(&self, episode_id: i64) -> bool {
        self.next_after(episode_id).is_some()
    }

    pub fn has_previous(&self, episode_id: i64) -> bool {
        self.previous_before(episode_id).is_some()
    }

    /// Replace the renditions of one episode once they are fetched
    pub fn set_sources(&mut self, episode_id: i64, sources: Vec<crate::VideoSource>) -> bool {
        match self.episodes.iter_mut().find(|episode| episode.id == episode_id) {
            Some(episode) => {
                episode.sources = sources;
                true
            }
            None => false,
        }
    }
}

impl From<Vec<Episode>> for EpisodeList {
    fn from(episodes: Vec<Episode>) -> Self {
        Self::new(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn season() -> EpisodeList {
        EpisodeList::new(vec![Episode::new(30, 3), Episode::new(10, 1), Episode::new(20, 2)])
    }

    #[test]
    fn test_sorted_by_number() {
        let ids: Vec<_> = season().iter().map(|e| e.id).collect();
        assert_eq!(ids, [10, 20, 30]);
    }

    #[test]
    fn test_adjacency() {
        let list = season();
        assert_eq!(list.next_after(10).map(|e| e.id), Some(20));
        assert_eq!(list.previous_before(20).map(|e| e.id), Some(10));
        assert!(!list.has_previous(10));
        assert!(!list.has_next(30));
    }

    #[test]
    fn test_unknown_episode_has_no_neighbours() {
        let list = season();
        assert!(!list.has_next(99));
        assert!(!list.has_previous(99));
    }
}
