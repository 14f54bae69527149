use anyhow::Result;

use gazette_core::{
    storage::{ArticleQuery, ArticleRepository, Database},
    AppConfig,
};

pub async fn run(config: &AppConfig, page: u32, limit: u32, search: Option<String>) -> Result<()> {
    let db = Database::new(config).await?;
    let result = ArticleRepository::new(&db)
        .list_page(&ArticleQuery::new(page, limit, search))
        .await?;

    if result.articles.is_empty() {
        println!("No articles found.");
        return Ok(());
    }

    for article in &result.articles {
        println!(
            "[{}] {}  ({}, {})",
            article.id,
            article.title,
            article.source,
            article.pub_date.format("%Y-%m-%d %H:%M")
        );
        println!("    {}", article.link);
        if !article.description.is_empty() {
            println!("    {}", article.description_preview(120));
        }
    }

    let p = &result.pagination;
    println!(
        "\nPage {} of {} ({} articles)",
        p.page, p.total_pages, p.total
    );

    Ok(())
}
