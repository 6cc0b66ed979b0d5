//! Prompt assembly for the analysis backend.

use crate::video::VideoMetadata;

/// Maximum transcript size included in a prompt, in bytes.
pub const TRANSCRIPT_BYTE_BUDGET: usize = 50_000;

/// Truncates a transcript to at most the byte budget, backing off to
/// the nearest char boundary so multibyte text never splits.
pub fn truncate_transcript(text: &str) -> &str {
    if text.len() <= TRANSCRIPT_BYTE_BUDGET {
        return text;
    }
    let mut end = TRANSCRIPT_BYTE_BUDGET;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Formats a duration as `MM:SS`, or `HH:MM:SS` at one hour and beyond.
pub fn format_duration(seconds: u64) -> String {
    if seconds >= 3600 {
        format!(
            "{:02}:{:02}:{:02}",
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    } else {
        format!("{:02}:{:02}", seconds / 60, seconds % 60)
    }
}

pub fn standard_prompt(metadata: &VideoMetadata, transcript: &str) -> String {
    format!(
        r#"You are an expert video content analyst. Analyze the following video transcript and provide a comprehensive analysis.

VIDEO INFORMATION:
- Title: {title}
- Channel: {channel}
- Duration: {duration}

TRANSCRIPT:
{transcript}

Provide your analysis in the following JSON format:
{{
  "title": "A clear, descriptive title summarizing the video content",
  "summary": "A 2-3 paragraph comprehensive summary of the video content",
  "keyTakeaways": ["takeaway 1", "takeaway 2", "takeaway 3", "takeaway 4", "takeaway 5"],
  "timeline": [
    {{"timestamp": "00:00", "description": "Introduction", "details": ["Key point 1", "Key point 2"]}},
    {{"timestamp": "02:30", "description": "Main topic", "details": ["Detail 1", "Detail 2"]}}
  ],
  "keywords": ["keyword1", "keyword2", "keyword3", "keyword4", "keyword5"]
}}

IMPORTANT:
- Extract 5-10 key takeaways that capture the main insights
- Create a timeline with major sections/topics (5-10 entries)
- Include 5-10 relevant keywords/tags
- Write in the same language as the transcript
- Be specific and actionable in your takeaways
- Ensure the summary captures the essence of the content

Respond ONLY with valid JSON, no additional text."#,
        title = metadata.title,
        channel = metadata.channel,
        duration = format_duration(metadata.duration_seconds),
        transcript = truncate_transcript(transcript),
    )
}

pub fn metadata_only_prompt(metadata: &VideoMetadata) -> String {
    format!(
        r#"You are an expert video content analyst. Based on the following video metadata, provide a reasonable analysis based on what you can infer from the title and channel.

VIDEO INFORMATION:
- Title: {title}
- Channel: {channel}
- Duration: {duration}

Since no transcript is available, provide an analysis based on what the title and channel name suggest about the content.

Provide your analysis in the following JSON format:
{{
  "title": "{title}",
  "summary": "A brief analysis based on what the video title and channel suggest about the content. Note that this analysis is based on metadata only as no transcript was available.",
  "keyTakeaways": ["Based on the title, this video likely covers...", "The channel {channel} typically produces..."],
  "timeline": [
    {{"timestamp": "00:00", "description": "Video begins", "details": ["Content based on title: {title}"]}}
  ],
  "keywords": ["keyword1", "keyword2", "keyword3"]
}}

IMPORTANT:
- Be honest that this is a metadata-only analysis
- Infer what you can from the title and channel name
- Keep the analysis brief but informative
- Use the same language as the video title

Respond ONLY with valid JSON, no additional text."#,
        title = metadata.title,
        channel = metadata.channel,
        duration = format_duration(metadata.duration_seconds),
    )
}

pub fn deep_prompt(metadata: &VideoMetadata) -> String {
    format!(
        r#"You are an expert video content analyst performing a deep analysis. Analyze the video content thoroughly including visual elements.

VIDEO INFORMATION:
- Title: {title}
- Channel: {channel}
- Duration: {duration}

Provide your analysis in the following JSON format:
{{
  "title": "A clear, descriptive title summarizing the video content",
  "summary": "A comprehensive 3-4 paragraph analysis of the video content including visual context",
  "keyTakeaways": ["takeaway 1", "takeaway 2", ...],
  "timeline": [
    {{"timestamp": "00:00", "description": "Section title", "details": ["Detail 1", "Detail 2"]}}
  ],
  "keywords": ["keyword1", "keyword2", ...],
  "visualAudit": [
    {{"timestamp": "01:30", "detail": "Description of visual element", "type": "Chart"}},
    {{"timestamp": "05:00", "detail": "Code snippet shown", "type": "Code"}}
  ]
}}

Visual Audit Types: "Visual Text", "Chart", "Code", "Product", "Other"

IMPORTANT:
- Provide detailed analysis of visual content (charts, diagrams, code, products shown)
- Extract 10-15 key takeaways
- Create a detailed timeline with 10-20 entries
- Include 10-15 relevant keywords
- Document important visual elements in visualAudit
- Match the primary language of the content

Respond ONLY with valid JSON, no additional text."#,
        title = metadata.title,
        channel = metadata.channel,
        duration = format_duration(metadata.duration_seconds),
    )
}
