use crate::attributes::{
    AgeRange, Ethnicity, Expression, FaceAttributes, Gender, HairColor, SceneStyle,
};

pub const STANDARD_STYLE_CLAUSE: &str = "Use standard photorealism: natural composition, true-to-life colors and no additional stylistic treatment beyond what the scene describes.";

/// Subject sentence such as `A 26-35, Asian Woman with Blonde hair who is wearing glasses`.
pub fn describe_subject(attrs: &FaceAttributes) -> String {
    let mut identity = Vec::new();
    if attrs.age_range != AgeRange::Any {
        identity.push(attrs.age_range.label());
    }
    if attrs.ethnicity != Ethnicity::Any {
        identity.push(attrs.ethnicity.label());
    }

    let mut core = String::from("A");
    if !identity.is_empty() {
        core.push(' ');
        core.push_str(&identity.join(", "));
    }
    if attrs.gender != Gender::Any {
        core.push(' ');
        core.push_str(attrs.gender.label());
    } else {
        core.push_str(" person");
    }

    let mut parts = vec![core];
    if attrs.hair_color != HairColor::Any {
        parts.push(format!("with {} hair", attrs.hair_color.label()));
    }
    let free_text = attrs.free_text.trim();
    if !free_text.is_empty() {
        parts.push(format!("who is {free_text}"));
    }

    parts.join(" ")
}

pub fn build_face_prompt(attrs: &FaceAttributes) -> String {
    let subject = describe_subject(attrs);
    format!(
        "Photorealistic masterpiece, 8K, DSLR studio headshot of a person described as: \"{subject}\". \
Shot with an 85mm prime lens, focusing sharply on the eyes. \
The lighting is soft and natural, revealing incredibly detailed skin texture, including subtle pores and imperfections. \
The hair should have realistic strands and flyaways. \
Ensure the final image has a natural human quality and avoids any hint of digital airbrushing, plastic-like skin, artificial smoothness, extra fingers or distorted features. \
The background is a simple, out-of-focus studio gray."
    )
}

fn style_guidance(style: SceneStyle) -> Option<&'static str> {
    match style {
        SceneStyle::Default => None,
        SceneStyle::WithAPet => Some(
            "Incorporate a cute pet like a cat or dog, showing a heartwarming interaction between the person and the pet.",
        ),
        SceneStyle::WithFood => Some(
            "Use beautifully presented food as a central prop to create a vibrant, natural scene.",
        ),
        SceneStyle::Playful => Some(
            "Capture a sense of movement and energy. The pose should be dynamic and candid, not static.",
        ),
        SceneStyle::Mysterious => Some(
            "Create intrigue by having the person turn partially or fully away from the camera.",
        ),
        SceneStyle::Charming => Some(
            "Add a touch of coyness by partially obscuring the face, perhaps with a hand, a prop, or hair.",
        ),
        SceneStyle::Relaxed => Some(
            "The mood should be calm and serene. A pose like looking up towards the sky or resting comfortably would be appropriate.",
        ),
        SceneStyle::Emotional => Some(
            "Focus on conveying a specific, deep emotion. The expression and body language are key to telling a story.",
        ),
    }
}

/// The style requirement embedded in the scene prompt.
pub fn style_clause(style: SceneStyle) -> String {
    match style_guidance(style) {
        Some(guidance) => format!(
            "The photo must embody a \"{}\" aesthetic. {guidance} This must influence the person's pose, the overall composition, and the mood of the image.",
            style.label().to_lowercase()
        ),
        None => STANDARD_STYLE_CLAUSE.to_string(),
    }
}

pub fn build_scene_prompt(scene: &str, expression: Expression, style: SceneStyle) -> String {
    format!(
        "Integrate the person from the provided image into the following scene: \"{scene}\". The final image must be hyper-realistic.

Key requirements, in order of priority:
1.  **Identity Preservation (highest priority):** Perfectly maintain the person's unique facial features and identity from the original image. Do not change their face structure, eye shape, nose, jawline or skin tone. If any other instruction conflicts with this one, this one wins.
2.  **Expression:** Subtly adjust their expression to be naturally \"{expression}\". Keep the change small enough that the person remains instantly recognizable.
3.  **Body Consistency:** Generate a body that is consistent with the provided face. Pay attention to plausible body type, build, age and skin tone that match the face.
4.  **Natural Pose:** The pose and body language must be natural, relaxed, and appropriate to the activity and emotional tone of the scene.
5.  **Lighting & Integration:**
    -   Create a highly detailed environment with fine textures and depth.
    -   Ensure the lighting on the person (face and body) perfectly matches the ambient lighting of the scene.
    -   Blend skin tones and textures seamlessly with the environment's lighting conditions.
    -   The final composition must look like a single, authentic photograph, not a composite.
6.  **Artistic Style:** {style}",
        scene = scene.trim(),
        expression = expression.label().to_lowercase(),
        style = style_clause(style),
    )
}

pub fn build_suggestion_prompt(face_description: &str, topic: &str) -> String {
    format!(
        "Based on the description of a person: \"{face}\", and the topic \"{topic}\", suggest exactly 3 highly detailed, creative, and 'aesthetic' social media photo ideas.

The suggestions must be diverse, directly related to the provided topic, and embody different popular photographic styles. For each suggestion, provide a rich and inspiring scenario that incorporates:

1.  **Core Concept & Style:** Clearly define the style. Is it playful and energetic, mysterious, emotional and thoughtful, or cute with a prop like food or a pet?
2.  **Specific Activity:** A descriptive action (e.g., \"arranging a bouquet of fresh tulips,\" not just \"with flowers\").
3.  **Pose & Mood:** A description of the pose and emotional tone (e.g., \"captured mid-laugh while turning away,\" \"a quiet moment of contemplation looking out a window\").
4.  **Setting & Lighting:** The environment and lighting conditions (e.g., \"in a cozy cafe during golden hour,\" \"on a misty morning in a park\").

Cover these styles, one suggestion each:
- **With Props:** Using eye-catching food or a cute pet.
- **Playful & Dynamic:** Capturing movement and energy. Poses could include turning away, partially hiding the face, or looking up at the sky.
- **\"Deep\" & Emotional:** Creating a moody, story-driven image that conveys a feeling.

The final suggestions should be concise enough to be used as prompts but detailed enough to be inspiring.",
        face = face_description.trim(),
        topic = topic.trim(),
    )
}
