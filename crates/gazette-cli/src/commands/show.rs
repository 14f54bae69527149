use anyhow::{bail, Result};

use gazette_core::{
    storage::{ArticleRepository, Database},
    AppConfig,
};

pub async fn run(config: &AppConfig, id: i64) -> Result<()> {
    let db = Database::new(config).await?;
    let Some(article) = ArticleRepository::new(&db).find_by_id(id).await? else {
        bail!(gazette_core::Error::ArticleNotFound(id));
    };

    println!("{}", article.title);
    println!("Source:    {}", article.source);
    println!("Link:      {}", article.link);
    println!("Published: {}", article.pub_date.format("%Y-%m-%d %H:%M UTC"));
    if !article.author.is_empty() {
        println!("Author:    {}", article.author);
    }
    if !article.image_url.is_empty() {
        println!("Image:     {}", article.image_url);
    }
    println!("Stored:    {}", article.created_at.format("%Y-%m-%d %H:%M UTC"));

    if !article.description.is_empty() {
        println!("\n{}", article.description);
    }

    Ok(())
}
