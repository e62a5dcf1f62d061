use crate::cmd::Context;
use crate::output::{print_finding, print_json};

/// Full quality analysis of one story. Read-only; the cached finding on the
/// story is not touched.
pub fn run(ctx: &Context, story_id: &str) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let story = store.get_story(story_id)?;
    let finding = store.analyze_story(story_id)?;
    if ctx.json {
        return print_json(&serde_json::json!({
            "story_id": story.id,
            "finding": finding,
        }));
    }
    println!("{} [{}]", story.title, story.id);
    print_finding(&finding);
    Ok(())
}
