//! Plain-text output for the terminal.

use rym_core::{Album, AlbumView, ChartEntry};

fn stars(average: f64) -> String {
    let filled = average.round().clamp(0.0, 5.0) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

pub fn album(view: &AlbumView) {
    let album = &view.album;
    let agg = &view.aggregate;

    println!("{}", album.display_label());
    if !album.genre.is_empty() {
        println!("Genre: {}", album.genre.join(", "));
    }
    if let Some(cover) = &album.cover {
        println!("Cover: {cover}");
    }
    println!(
        "Rating: {} {:.2} ({} ratings, {} reviews)",
        stars(agg.average_rating),
        agg.average_rating,
        agg.ratings_count,
        agg.review_total()
    );
    for rank in &agg.ranks {
        match rank.year {
            Some(year) => println!("#{} of {}", rank.rank, year),
            None => println!("#{} overall", rank.rank),
        }
    }

    if !album.track_list.is_empty() {
        println!();
        for (i, track) in album.track_list.iter().enumerate() {
            println!("{:>3}. {}", i + 1, track);
        }
    }

    if !agg.reviews.is_empty() {
        println!();
        for review in &agg.reviews {
            let when = review
                .posted_at()
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            println!(
                "{} {} {} ({} likes)",
                review.user_id,
                stars(review.rating as f64),
                when,
                review.like_count
            );
            if let Some(comment) = review.comment_text() {
                println!("    {comment}");
            }
        }
    }
}

pub fn candidates(query: &str, albums: &[Album]) {
    println!("Several albums match {query:?}:");
    for album in albums {
        println!("  {:<8} {}", album.album_id, album.display_label());
    }
    println!("Run again with one of the ids above.");
}

pub fn chart(year: i32, entries: &[ChartEntry]) {
    if entries.is_empty() {
        println!("No chart for {year}.");
        return;
    }
    println!("Top albums of {year}");
    for entry in entries {
        let release = if entry.release_info.is_empty() {
            String::new()
        } else {
            format!(" ({})", entry.release_info)
        };
        println!(
            "{:>3}. {} – {}{}  {:.2} · {} ratings · {} reviews",
            entry.rank,
            entry.title,
            entry.artist,
            release,
            entry.average_rating,
            entry.ratings_count,
            entry.reviews_count
        );
    }
}
